//! Particle field generation: maps a thumbnail's screen rectangle onto a
//! subdivided grid of sprites, one per grid vertex, each anchored to the
//! screen pixel it was sampled from.
//!
//! World space is egui points, y-down, origin at the viewport center, so one
//! world unit matches one on-screen point at the settle plane.

use rayon::prelude::*;

use crate::trajectory::DELAY_MAX;

/// Per-particle flight attributes, uploaded once per session and never
/// rewritten afterwards. Start positions live in their own buffer because
/// they are regenerated on every viewport resize.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SpriteAttr {
    pub curve_offset: [f32; 3],
    pub delay: f32,
    pub seed: f32,
    pub uv: [f32; 2],
    pub _pad: f32,
}

pub struct ParticleField {
    pub segments: u32,
    /// Settle plane dimensions in world units.
    pub plane: [f32; 2],
    pub start_positions: Vec<[f32; 3]>,
    pub attrs: Vec<SpriteAttr>,
}

impl ParticleField {
    pub fn particle_count(segments: u32) -> usize {
        ((segments + 1) * (segments + 1)) as usize
    }

    /// Build a fresh field for a newly opened image. `origin` is the
    /// thumbnail's current screen rect, `natural` the decoded pixel
    /// dimensions (the decode must have completed before this is called).
    pub fn generate(
        segments: u32,
        session_seed: u32,
        natural: (u32, u32),
        origin: egui::Rect,
        viewport: egui::Rect,
        padding: f32,
    ) -> Self {
        let side = segments + 1;
        let attrs: Vec<SpriteAttr> = (0..side * side)
            .into_par_iter()
            .map(|i| {
                let ix = i % side;
                let iy = i / side;
                let uv = [ix as f32 / segments as f32, iy as f32 / segments as f32];
                SpriteAttr {
                    curve_offset: [
                        hash_f32(session_seed ^ pcg(i * 2 + 1)) * 4.0 - 2.0,
                        hash_f32(session_seed ^ pcg(i * 2 + 2)) * 4.0 - 2.0,
                        0.0,
                    ],
                    delay: delay_for(uv, hash_f32(session_seed ^ pcg(i * 3 + 7))),
                    seed: hash_f32(session_seed.wrapping_add(pcg(i + 101))),
                    uv,
                    _pad: 0.0,
                }
            })
            .collect();

        let mut field = Self {
            segments,
            plane: [0.0, 0.0],
            start_positions: Vec::new(),
            attrs,
        };
        field.refit(natural, origin, viewport, padding);
        field
    }

    /// Recompute start positions and the settle plane for a new viewport or
    /// a new source image, preserving every particle's flight attributes.
    pub fn refit(
        &mut self,
        natural: (u32, u32),
        origin: egui::Rect,
        viewport: egui::Rect,
        padding: f32,
    ) {
        self.plane = fit_plane(natural, viewport, padding);
        let side = self.segments + 1;
        let segs = self.segments as f32;
        let center = viewport.center();
        self.start_positions = (0..side * side)
            .into_par_iter()
            .map(|i| {
                let ix = (i % side) as f32 / segs;
                let iy = (i / side) as f32 / segs;
                let sx = origin.min.x + ix * origin.width();
                let sy = origin.min.y + iy * origin.height();
                [sx - center.x, sy - center.y, 0.0]
            })
            .collect();
    }
}

/// Uniformly scale the image's natural dimensions so it fills the viewport
/// with `padding` headroom, preserving aspect ratio.
pub fn fit_plane(natural: (u32, u32), viewport: egui::Rect, padding: f32) -> [f32; 2] {
    let (nw, nh) = (natural.0.max(1) as f32, natural.1.max(1) as f32);
    let scale = (viewport.width() * padding / nw).min(viewport.height() * padding / nh);
    [nw * scale, nh * scale]
}

/// Delay from normalized distance-to-center: edge particles move first
/// (delay near 0), center particles last (near 0.25), with a small jitter.
/// Always inside [0, DELAY_MAX).
fn delay_for(uv: [f32; 2], jitter: f32) -> f32 {
    let dx = (uv[0] - 0.5) * 2.0;
    let dy = (uv[1] - 0.5) * 2.0;
    let dist = ((dx * dx + dy * dy).sqrt() / std::f32::consts::SQRT_2).min(1.0);
    ((1.0 - dist) * 0.25 + jitter * 0.05).clamp(0.0, DELAY_MAX - 0.001)
}

// PCG hash, the standard one-liner for stateless per-index randomness.
fn pcg(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

fn hash_f32(input: u32) -> f32 {
    pcg(input) as f32 / u32::MAX as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> egui::Rect {
        egui::Rect::from_min_size(egui::pos2(x, y), egui::vec2(w, h))
    }

    fn sample_field() -> ParticleField {
        ParticleField::generate(
            16,
            0xBEEF,
            (1600, 1200),
            rect(100.0, 200.0, 160.0, 120.0),
            rect(0.0, 0.0, 1920.0, 1080.0),
            0.9,
        )
    }

    #[test]
    fn particle_count_matches_grid() {
        let f = sample_field();
        assert_eq!(f.attrs.len(), ParticleField::particle_count(16));
        assert_eq!(f.start_positions.len(), f.attrs.len());
    }

    #[test]
    fn start_positions_reproduce_the_thumbnail_rect() {
        let f = sample_field();
        // corner uv (0,0) maps to the rect's min, (1,1) to its max,
        // expressed relative to the viewport center (960, 540).
        let first = f.start_positions[0];
        assert!((first[0] - (100.0 - 960.0)).abs() < 1e-3);
        assert!((first[1] - (200.0 - 540.0)).abs() < 1e-3);
        let last = f.start_positions[f.start_positions.len() - 1];
        assert!((last[0] - (260.0 - 960.0)).abs() < 1e-3);
        assert!((last[1] - (320.0 - 540.0)).abs() < 1e-3);
    }

    #[test]
    fn delays_stay_in_range() {
        let f = sample_field();
        for a in &f.attrs {
            assert!(a.delay >= 0.0 && a.delay < DELAY_MAX);
        }
    }

    #[test]
    fn delay_bucket_means_decrease_from_center_to_edge() {
        let f = sample_field();
        // bucket particles by distance from the uv center; bucket means must
        // be non-increasing outward despite per-particle jitter.
        let mut sums = [0.0f32; 4];
        let mut counts = [0usize; 4];
        for a in &f.attrs {
            let dx = (a.uv[0] - 0.5) * 2.0;
            let dy = (a.uv[1] - 0.5) * 2.0;
            let d = ((dx * dx + dy * dy).sqrt() / std::f32::consts::SQRT_2).min(0.999);
            let b = (d * 4.0) as usize;
            sums[b] += a.delay;
            counts[b] += 1;
        }
        let means: Vec<f32> = sums
            .iter()
            .zip(&counts)
            .map(|(s, &c)| s / c.max(1) as f32)
            .collect();
        for w in means.windows(2) {
            assert!(w[0] >= w[1], "bucket means not decreasing: {means:?}");
        }
    }

    #[test]
    fn curve_offsets_are_bounded_and_planar() {
        let f = sample_field();
        for a in &f.attrs {
            assert!(a.curve_offset[0] >= -2.0 && a.curve_offset[0] <= 2.0);
            assert!(a.curve_offset[1] >= -2.0 && a.curve_offset[1] <= 2.0);
            assert_eq!(a.curve_offset[2], 0.0);
        }
    }

    #[test]
    fn refit_preserves_flight_attributes() {
        let mut f = sample_field();
        let before: Vec<SpriteAttr> = f.attrs.clone();
        f.refit(
            (1600, 1200),
            rect(50.0, 60.0, 80.0, 60.0),
            rect(0.0, 0.0, 1280.0, 720.0),
            0.9,
        );
        assert_eq!(f.attrs.len(), before.len());
        for (a, b) in f.attrs.iter().zip(&before) {
            assert_eq!(a.curve_offset, b.curve_offset);
            assert_eq!(a.delay, b.delay);
            assert_eq!(a.seed, b.seed);
        }
        // but the anchors moved with the new rect
        assert!((f.start_positions[0][0] - (50.0 - 640.0)).abs() < 1e-3);
    }

    #[test]
    fn fit_plane_preserves_aspect_and_padding() {
        let vp = rect(0.0, 0.0, 1000.0, 800.0);
        let plane = fit_plane((2000, 1000), vp, 0.9);
        // width-bound: 1000 * 0.9 = 900 wide, 450 tall
        assert!((plane[0] - 900.0).abs() < 1e-3);
        assert!((plane[1] - 450.0).abs() < 1e-3);
        let tall = fit_plane((500, 2000), vp, 0.5);
        // height-bound: 800 * 0.5 = 400 tall, 100 wide
        assert!((tall[0] - 100.0).abs() < 1e-3);
        assert!((tall[1] - 400.0).abs() < 1e-3);
    }
}
