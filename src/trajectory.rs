//! Host-side evaluation of the particle flight path.
//!
//! The WGSL shader (`gpu/viewer.wgsl`) is the runtime implementation; this
//! module holds the named tunable constants and an identical CPU evaluation
//! used by tests and by anything that needs to predict where a particle is.
//! Keep the constants and `flight_position` in sync with the shader.

use crate::animations::easing::smoothstep;

// Phase windows over local progress. The three windows partition the flight
// and must stay monotonically ordered and overlapping so the blends are
// continuous: ramp end < travel start < scatter end < settle start <
// travel end < settle end.
/// Scatter burst ramps in over [0, SCATTER_RAMP_END].
pub const SCATTER_RAMP_END: f32 = 0.10;
/// Scatter burst has fully decayed by here (quadratic falloff).
pub const SCATTER_END: f32 = 0.40;
/// Free travel (Bezier) window.
pub const TRAVEL_START: f32 = 0.30;
pub const TRAVEL_END: f32 = 0.75;
/// Settling window: every transient term reaches zero at SETTLE_END.
pub const SETTLE_START: f32 = 0.70;
pub const SETTLE_END: f32 = 1.00;

/// Upper bound (exclusive) for per-particle delays.
pub const DELAY_MAX: f32 = 0.30;
/// Sprite size ramps from zero over the first quarter of local progress.
pub const SIZE_RAMP_END: f32 = 0.25;

// Displacement amplitudes, in world units (device pixels at the settle
// plane). Opening uses the larger values; closing the smaller ones.
pub const SCATTER_AMP_OPEN: f32 = 170.0;
pub const SCATTER_AMP_CLOSE: f32 = 60.0;
pub const CURVE_AMP_OPEN: f32 = 240.0;
pub const CURVE_AMP_CLOSE: f32 = 80.0;
pub const FLOAT_AMP: f32 = 7.0;
pub const FLOAT_FREQ: f32 = 1.7;
pub const DEPTH_AMP: f32 = 120.0;

// Image-to-image morph displacement, driven by dispersion alone.
pub const SWIRL_AMP: f32 = 320.0;
pub const SWIRL_FREQ: f32 = 0.9;

/// Remap global progress into a particle's local progress. Every particle
/// reaches 1 exactly when the global progress reaches 1, regardless of its
/// delay.
pub fn local_progress(progress: f32, delay: f32) -> f32 {
    ((progress - delay) / (1.0 - delay)).clamp(0.0, 1.0)
}

/// The flat planar position a particle converges to, from its grid
/// coordinate and the settle plane's size. World space is y-down with the
/// origin at the viewport center.
pub fn settle_position(uv: [f32; 2], plane: [f32; 2]) -> [f32; 3] {
    [(uv[0] - 0.5) * plane[0], (uv[1] - 0.5) * plane[1], 0.0]
}

/// Evaluate a particle's world position. Mirrors `flight_position` in
/// `gpu/viewer.wgsl` term for term.
#[allow(clippy::too_many_arguments)]
pub fn flight_position(
    start: [f32; 3],
    curve_offset: [f32; 3],
    delay: f32,
    seed: f32,
    uv: [f32; 2],
    plane: [f32; 2],
    progress: f32,
    dispersion: f32,
    time: f32,
    opening: bool,
) -> [f32; 3] {
    let p = local_progress(progress, delay);
    let settle = settle_position(uv, plane);
    let open = if opening { 1.0 } else { 0.0 };

    // Quadratic Bezier from the anchor through a curved midpoint to the
    // settle position.
    let t = smoothstep(TRAVEL_START, TRAVEL_END, p);
    let curve_amp = lerp(CURVE_AMP_CLOSE, CURVE_AMP_OPEN, open);
    let omt = 1.0 - t;
    let mut pos = [0.0f32; 3];
    for i in 0..3 {
        let mid = (start[i] + settle[i]) * 0.5 + curve_offset[i] * curve_amp;
        pos[i] = start[i] * omt * omt + mid * 2.0 * omt * t + settle[i] * t * t;
    }

    // Scatter burst: zero at rest, peaks early, quadratic falloff.
    let a = seed * 18.849_556; // seed * 3 * TAU
    let dir = [a.cos(), a.sin(), 0.0];
    let ramp = smoothstep(0.0, SCATTER_RAMP_END, p);
    let fall = 1.0 - smoothstep(SCATTER_RAMP_END, SCATTER_END, p);
    let scatter_amp = lerp(SCATTER_AMP_CLOSE, SCATTER_AMP_OPEN, open);

    // Mid-flight drift and z-separation, gated so both vanish at the anchor
    // and at the settle position.
    let settle_fade = 1.0 - smoothstep(SETTLE_START, SETTLE_END, p);
    let bump = smoothstep(0.0, TRAVEL_START, p) * settle_fade;
    let phase = curve_offset[0] * 1.7 + curve_offset[1] * 2.3;
    let drift = [
        (time * FLOAT_FREQ + phase).sin() * FLOAT_AMP,
        (time * FLOAT_FREQ * 0.83 + phase).cos() * FLOAT_AMP,
        0.0,
    ];
    let depth = [0.0, 0.0, ((seed * 7.31).fract() - 0.5) * 2.0 * DEPTH_AMP];

    for i in 0..3 {
        pos[i] +=
            (dir[i] * scatter_amp * ramp * fall * fall + (drift[i] + depth[i]) * bump) * settle_fade;
    }

    // Morph swirl: independent of open/close progress.
    let sa = a + time * SWIRL_FREQ;
    pos[0] += sa.cos() * dispersion * SWIRL_AMP;
    pos[1] += sa.sin() * dispersion * SWIRL_AMP;

    pos
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
