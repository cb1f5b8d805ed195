//! The transition state machine: open/close tweens, image-to-image morphs,
//! and the lifecycle of the per-session GPU resources.
//!
//! All progress is advanced from `tick(now, ..)` where `now` is egui's input
//! time, so stage durations are wall-clock and frame-rate independent. The
//! only asynchronous boundary is image decoding; while a decode or an
//! animation stage is in flight, new requests are rejected rather than
//! queued.

pub mod chrome;
pub mod pagination;
pub mod session;

use anyhow::{bail, Result};

use crate::animations::easing::{self, smoothstep, Easing};
use crate::animations::Tween;
use crate::capability::Capability;
use crate::config::ViewerConfig;
use crate::field::ParticleField;
use crate::gallery::GalleryItem;
use crate::gpu::{GeometryGuard, MaterialGuard, SessionFactory};
use crate::loader::{DecodeJob, Decoder, LoadKind, LoadResult};

use chrome::ChromeState;
use session::Session;

/// Duration of each navigation morph stage (dispersion, reassembly),
/// deliberately independent of the configured open/close durations.
pub const MORPH_STAGE_SECS: f32 = 0.8;

/// Fraction of the dispersion stage over which the sprite cloud takes over
/// from the plane.
const SPRITE_TAKEOVER: f32 = 0.25;

enum Phase {
    Idle,
    Opening(OpenStage),
    Open,
    Closing { tween: Tween },
    Navigating(NavStage),
}

enum OpenStage {
    /// Waiting for the source decode; geometry generation needs the natural
    /// dimensions, so this is a correctness precondition, not best effort.
    Loading { index: usize, origin: egui::Rect },
    Animating { tween: Tween },
}

enum NavStage {
    Loading { target: usize },
    Dispersing { target: usize, started: f64 },
    Reassembling { started: f64 },
}

/// Per-frame values consumed by the paint callback.
pub struct DrawParams {
    pub progress: f32,
    pub dispersion: f32,
    pub texture_mix: f32,
    pub opening: bool,
    pub sprite_opacity: f32,
    pub plane_opacity: f32,
    pub plane: [f32; 2],
    pub point_size: f32,
    pub geometry: GeometryGuard,
    pub material: MaterialGuard,
}

pub struct Viewer {
    items: Vec<GalleryItem>,
    config: ViewerConfig,
    caps: Capability,
    factory: Box<dyn SessionFactory>,
    decoder: Box<dyn Decoder>,
    phase: Phase,
    session: Option<Session>,
    chrome: ChromeState,
    /// Bumped whenever in-flight work must be invalidated; decode results
    /// from older epochs are dropped on arrival.
    epoch: u64,
    progress: f32,
    dispersion: f32,
    texture_mix: f32,
    opening_mode: bool,
    viewport: egui::Rect,
}

impl Viewer {
    pub fn new(
        items: Vec<GalleryItem>,
        config: ViewerConfig,
        caps: Capability,
        factory: Box<dyn SessionFactory>,
        decoder: Box<dyn Decoder>,
    ) -> Result<Self> {
        if items.is_empty() {
            bail!("viewer needs at least one gallery item");
        }
        let chrome = ChromeState::new(config.max_visible_dots);
        Ok(Self {
            items,
            config,
            caps,
            factory,
            decoder,
            phase: Phase::Idle,
            session: None,
            chrome,
            epoch: 0,
            progress: 0.0,
            dispersion: 0.0,
            texture_mix: 0.0,
            opening_mode: true,
            viewport: egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(1.0, 1.0)),
        })
    }

    pub fn chrome(&self) -> &ChromeState {
        &self.chrome
    }

    pub fn chrome_mut(&mut self) -> &mut ChromeState {
        &mut self.chrome
    }

    pub fn items(&self) -> &[GalleryItem] {
        &self.items
    }

    pub fn current_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.index)
    }

    pub fn is_animating(&self) -> bool {
        !matches!(self.phase, Phase::Idle | Phase::Open)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Open)
    }

    /// Open the viewer on `index`, flying particles out of `origin` (the
    /// clicked thumbnail's screen rect). No-op unless idle.
    pub fn open(&mut self, index: usize, origin: egui::Rect, viewport: egui::Rect, _now: f64) {
        if !matches!(self.phase, Phase::Idle) || index >= self.items.len() {
            return;
        }
        self.viewport = viewport;
        self.opening_mode = true;
        self.progress = 0.0;
        self.dispersion = 0.0;
        self.texture_mix = 0.0;
        self.epoch += 1;
        self.request_decode(index);
        self.phase = Phase::Opening(OpenStage::Loading { index, origin });
        self.chrome.overlay_visible = true;
        self.chrome.backdrop_alpha = 0.0;
        self.chrome.controls_enabled = false;
        let title = self.items[index].title.clone();
        self.chrome.show_item(index, self.items.len(), &title);
    }

    /// Close the overlay. From a settled open state this animates; while
    /// any animation or decode is in flight it cancels and performs the
    /// terminal side effects immediately.
    pub fn close(&mut self, now: f64) {
        match &self.phase {
            Phase::Idle | Phase::Closing { .. } => {}
            Phase::Open => {
                self.opening_mode = false;
                self.chrome.controls_enabled = false;
                let tween = Tween::new(
                    self.progress,
                    0.0,
                    now,
                    self.config.close_duration,
                    Easing::QuartOut,
                );
                self.phase = Phase::Closing { tween };
                self.advance(now, &[]);
            }
            Phase::Opening(OpenStage::Loading { index, .. }) => {
                let index = *index;
                self.cancel_to_idle(index);
            }
            Phase::Opening(OpenStage::Animating { .. }) | Phase::Navigating(_) => {
                let index = self.session.as_ref().map(|s| s.index).unwrap_or(0);
                self.cancel_to_idle(index);
            }
        }
    }

    pub fn next(&mut self, now: f64) {
        if let Some(current) = self.navigable_index() {
            let target = (current + 1) % self.items.len();
            self.start_navigation(target, now);
        }
    }

    pub fn prev(&mut self, now: f64) {
        if let Some(current) = self.navigable_index() {
            let target = (current + self.items.len() - 1) % self.items.len();
            self.start_navigation(target, now);
        }
    }

    pub fn goto_index(&mut self, target: usize, now: f64) {
        if let Some(current) = self.navigable_index() {
            if target != current && target < self.items.len() {
                self.start_navigation(target, now);
            }
        }
    }

    /// Full teardown: cancels pending work and releases every resource.
    /// The viewer stays usable; a later `open` allocates fresh handles.
    pub fn destroy(&mut self) {
        self.epoch += 1;
        self.session = None;
        self.phase = Phase::Idle;
        self.progress = 0.0;
        self.dispersion = 0.0;
        self.texture_mix = 0.0;
        self.chrome.reset();
        eprintln!("[viewer] torn down, outstanding={}", self.factory.ledger().outstanding());
    }

    /// Advance animations and poll the decoder. `origins` maps item index to
    /// its thumbnail rect when currently laid out; used to re-anchor after
    /// navigation and resizes. Returns whether a repaint should be requested.
    pub fn tick(&mut self, now: f64, viewport: egui::Rect, origins: &[Option<egui::Rect>]) -> bool {
        if viewport != self.viewport {
            self.viewport = viewport;
            self.refit_session(origins);
        }
        while let Some(result) = self.decoder.poll() {
            self.handle_load(result, now, origins);
        }
        self.advance(now, origins);
        self.is_animating()
    }

    /// Values for the overlay paint callback; None while nothing is ready
    /// to draw (no session yet).
    pub fn draw_params(&self, now: f64) -> Option<DrawParams> {
        let session = self.session.as_ref()?;
        let (sprite_opacity, plane_opacity) = self.layer_opacities(now);
        Some(DrawParams {
            progress: self.progress,
            dispersion: self.dispersion,
            texture_mix: self.texture_mix,
            opening: self.opening_mode,
            sprite_opacity,
            plane_opacity,
            plane: session.field.plane,
            point_size: self.config.point_size,
            geometry: session.geometry.clone(),
            material: session.material.clone(),
        })
    }

    // ---- internals ---------------------------------------------------------

    fn navigable_index(&self) -> Option<usize> {
        if !matches!(self.phase, Phase::Open) || self.items.len() < 2 {
            return None;
        }
        self.session.as_ref().map(|s| s.index)
    }

    fn start_navigation(&mut self, target: usize, _now: f64) {
        self.chrome.controls_enabled = false;
        self.epoch += 1;
        self.request_decode(target);
        self.phase = Phase::Navigating(NavStage::Loading { target });
    }

    fn request_decode(&mut self, index: usize) {
        let path = self.items[index]
            .source_for(&self.config.source_key)
            .to_path_buf();
        self.decoder.request(DecodeJob {
            epoch: self.epoch,
            index,
            kind: LoadKind::Source,
            path,
        });
    }

    fn handle_load(&mut self, result: LoadResult, now: f64, origins: &[Option<egui::Rect>]) {
        if result.epoch != self.epoch {
            return; // a session boundary was crossed while this decoded
        }
        match &self.phase {
            Phase::Opening(OpenStage::Loading { index, origin }) => {
                let (index, origin) = (*index, *origin);
                match result.result {
                    Ok(image) => {
                        let built = self.build_session(index, origin, &image);
                        match built {
                            Ok(session) => {
                                self.session = Some(session);
                                let tween = Tween::new(
                                    0.0,
                                    1.0,
                                    now,
                                    self.config.open_duration,
                                    Easing::QuartOut,
                                );
                                self.phase = Phase::Opening(OpenStage::Animating { tween });
                                self.advance(now, origins);
                            }
                            Err(e) => self.abort_open(index, &e.to_string()),
                        }
                    }
                    Err(e) => self.abort_open(index, &format!("{e:#}")),
                }
            }
            Phase::Navigating(NavStage::Loading { target }) => {
                let target = *target;
                match result.result {
                    Ok(image) => {
                        let staged = self.stage_next_texture(&image);
                        match staged {
                            Ok(()) => {
                                if self.caps.reduced_motion {
                                    self.finish_swap(target, origins);
                                    self.dispersion = 0.0;
                                    self.texture_mix = 0.0;
                                    self.phase = Phase::Open;
                                    self.chrome.controls_enabled = true;
                                } else {
                                    self.phase = Phase::Navigating(NavStage::Dispersing {
                                        target,
                                        started: now,
                                    });
                                }
                            }
                            Err(e) => self.abort_navigation(&e.to_string()),
                        }
                    }
                    Err(e) => self.abort_navigation(&format!("{e:#}")),
                }
            }
            _ => {}
        }
    }

    fn build_session(
        &mut self,
        index: usize,
        origin: egui::Rect,
        image: &crate::loader::DecodedImage,
    ) -> Result<Session> {
        let natural = (image.width, image.height);
        let field = ParticleField::generate(
            self.config.segments,
            self.epoch as u32,
            natural,
            origin,
            self.viewport,
            self.config.padding,
        );
        let texture = self.factory.texture(image)?;
        let geometry = self.factory.geometry(&field)?;
        let material = self.factory.material(&texture, &texture)?;
        Ok(Session {
            index,
            natural,
            origin,
            field,
            texture,
            next_texture: None,
            next_natural: None,
            geometry,
            material,
        })
    }

    fn stage_next_texture(&mut self, image: &crate::loader::DecodedImage) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            bail!("navigation without an active session");
        };
        let next = self.factory.texture(image)?;
        let material = self.factory.material(&session.texture, &next)?;
        session.material = material;
        session.next_natural = Some((image.width, image.height));
        session.next_texture = Some(next);
        Ok(())
    }

    fn finish_swap(&mut self, target: usize, origins: &[Option<egui::Rect>]) {
        let viewport = self.viewport;
        let padding = self.config.padding;
        let len = self.items.len();
        let title = self.items[target].title.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.promote_next() {
            return;
        }
        if let Ok(material) = self.factory.material(&session.texture, &session.texture) {
            session.material = material;
        }
        let origin = origins
            .get(target)
            .copied()
            .flatten()
            .unwrap_or_else(|| fallback_origin(viewport));
        session
            .field
            .refit(session.natural, origin, viewport, padding);
        self.factory
            .write_start_positions(&session.geometry, &session.field);
        session.origin = origin;
        session.index = target;
        self.texture_mix = 0.0;
        self.chrome.show_item(target, len, &title);
    }

    fn advance(&mut self, now: f64, origins: &[Option<egui::Rect>]) {
        match &self.phase {
            Phase::Idle | Phase::Open => {}
            Phase::Opening(OpenStage::Loading { .. }) | Phase::Navigating(NavStage::Loading { .. }) => {
                // suspended at the decode boundary
            }
            Phase::Opening(OpenStage::Animating { tween }) => {
                let tween = *tween;
                self.progress = tween.sample(now);
                self.chrome.backdrop_alpha = self.progress;
                if tween.finished(now) {
                    self.progress = 1.0;
                    self.chrome.backdrop_alpha = 1.0;
                    self.chrome.controls_enabled = true;
                    self.phase = Phase::Open;
                }
            }
            Phase::Closing { tween } => {
                let tween = *tween;
                self.progress = tween.sample(now);
                self.chrome.backdrop_alpha = self.progress;
                if tween.finished(now) {
                    self.finish_close();
                }
            }
            Phase::Navigating(NavStage::Dispersing { target, started }) => {
                let (target, started) = (*target, *started);
                let t = stage_t(started, now);
                self.dispersion = easing::evaluate(t, Easing::Smooth);
                self.texture_mix = self.dispersion;
                if t >= 1.0 {
                    self.dispersion = 1.0;
                    self.finish_swap(target, origins);
                    self.phase = Phase::Navigating(NavStage::Reassembling { started: now });
                }
            }
            Phase::Navigating(NavStage::Reassembling { started }) => {
                let started = *started;
                let t = stage_t(started, now);
                self.dispersion = 1.0 - easing::evaluate(t, Easing::QuartOut);
                if t >= 1.0 {
                    self.dispersion = 0.0;
                    self.chrome.controls_enabled = true;
                    self.phase = Phase::Open;
                }
            }
        }
    }

    fn layer_opacities(&self, now: f64) -> (f32, f32) {
        match &self.phase {
            Phase::Navigating(NavStage::Loading { .. }) => (0.0, 1.0),
            Phase::Navigating(NavStage::Dispersing { started, .. }) => {
                let sprite = smoothstep(0.0, SPRITE_TAKEOVER, stage_t(*started, now));
                (sprite, 1.0 - sprite)
            }
            Phase::Navigating(NavStage::Reassembling { started }) => {
                let plane = smoothstep(0.5, 1.0, stage_t(*started, now));
                (1.0 - plane, plane)
            }
            _ => {
                let plane = smoothstep(self.config.crossfade_start, 1.0, self.progress);
                (1.0 - plane, plane)
            }
        }
    }

    fn refit_session(&mut self, origins: &[Option<egui::Rect>]) {
        let viewport = self.viewport;
        let padding = self.config.padding;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let origin = origins
            .get(session.index)
            .copied()
            .flatten()
            .unwrap_or(session.origin);
        session
            .field
            .refit(session.natural, origin, viewport, padding);
        session.origin = origin;
        self.factory
            .write_start_positions(&session.geometry, &session.field);
    }

    fn finish_close(&mut self) {
        let index = self.session.as_ref().map(|s| s.index).unwrap_or(0);
        self.session = None;
        self.phase = Phase::Idle;
        self.progress = 0.0;
        self.dispersion = 0.0;
        self.texture_mix = 0.0;
        self.chrome.close_complete(index);
    }

    fn cancel_to_idle(&mut self, index: usize) {
        self.epoch += 1;
        self.session = None;
        self.phase = Phase::Idle;
        self.progress = 0.0;
        self.dispersion = 0.0;
        self.texture_mix = 0.0;
        self.chrome.close_complete(index);
    }

    fn abort_open(&mut self, index: usize, error: &str) {
        eprintln!("[viewer] open aborted: {error}");
        self.chrome.last_error = Some(format!("could not open image {}: {error}", index + 1));
        self.session = None;
        self.phase = Phase::Idle;
        self.chrome.overlay_visible = false;
        self.chrome.backdrop_alpha = 0.0;
        self.chrome.controls_enabled = false;
    }

    fn abort_navigation(&mut self, error: &str) {
        eprintln!("[viewer] navigation aborted: {error}");
        self.chrome.last_error = Some(format!("could not load image: {error}"));
        if let Some(session) = self.session.as_mut() {
            session.discard_next();
        }
        self.phase = Phase::Open;
        self.chrome.controls_enabled = true;
    }
}

fn stage_t(started: f64, now: f64) -> f32 {
    (((now - started) as f32) / MORPH_STAGE_SECS).clamp(0.0, 1.0)
}

fn fallback_origin(viewport: egui::Rect) -> egui::Rect {
    egui::Rect::from_center_size(viewport.center(), egui::vec2(48.0, 48.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessFactory, ResourceLedger};
    use crate::loader::DecodedImage;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::sync::Arc;

    #[derive(Default)]
    struct ManualState {
        requests: Vec<DecodeJob>,
        results: VecDeque<LoadResult>,
    }

    struct ManualDecoder(Rc<RefCell<ManualState>>);

    impl Decoder for ManualDecoder {
        fn request(&self, job: DecodeJob) {
            self.0.borrow_mut().requests.push(job);
        }
        fn poll(&self) -> Option<LoadResult> {
            self.0.borrow_mut().results.pop_front()
        }
    }

    fn rect(x: f32, y: f32, w: f32, h: f32) -> egui::Rect {
        egui::Rect::from_min_size(egui::pos2(x, y), egui::vec2(w, h))
    }

    fn viewport() -> egui::Rect {
        rect(0.0, 0.0, 1920.0, 1080.0)
    }

    fn origins(n: usize) -> Vec<Option<egui::Rect>> {
        (0..n)
            .map(|i| Some(rect(40.0 + 200.0 * i as f32, 60.0, 160.0, 120.0)))
            .collect()
    }

    struct Rig {
        viewer: Viewer,
        state: Rc<RefCell<ManualState>>,
        ledger: Arc<ResourceLedger>,
        origins: Vec<Option<egui::Rect>>,
    }

    impl Rig {
        fn new(n: usize, caps: Capability, config: ViewerConfig) -> Self {
            let items: Vec<GalleryItem> = (0..n)
                .map(|i| GalleryItem::from_path(format!("img_{i}.png").into()))
                .collect();
            let factory = HeadlessFactory::new();
            let ledger = factory.ledger();
            let state = Rc::new(RefCell::new(ManualState::default()));
            let viewer = Viewer::new(
                items,
                config.resolve(&caps),
                caps,
                Box::new(factory),
                Box::new(ManualDecoder(state.clone())),
            )
            .unwrap();
            Self {
                viewer,
                state,
                ledger,
                origins: origins(n),
            }
        }

        fn deliver_ok(&mut self, now: f64) {
            let (epoch, index) = {
                let s = self.state.borrow();
                let job = s.requests.last().expect("no decode requested");
                (job.epoch, job.index)
            };
            self.deliver(epoch, index, Ok(DecodedImage::solid(64, 48, [200, 90, 30, 255])), now);
        }

        fn deliver(
            &mut self,
            epoch: u64,
            index: usize,
            result: anyhow::Result<DecodedImage>,
            now: f64,
        ) {
            self.state.borrow_mut().results.push_back(LoadResult {
                epoch,
                index,
                kind: LoadKind::Source,
                result,
            });
            self.tick(now);
        }

        fn tick(&mut self, now: f64) -> bool {
            self.viewer.tick(now, viewport(), &self.origins)
        }
    }

    fn quick_config() -> ViewerConfig {
        ViewerConfig {
            segments: 8,
            open_duration: 2.0,
            close_duration: 1.2,
            max_visible_dots: 5,
            ..Default::default()
        }
    }

    fn open_fully(rig: &mut Rig, index: usize, t0: f64) -> f64 {
        rig.viewer
            .open(index, rig.origins[index].unwrap(), viewport(), t0);
        rig.deliver_ok(t0 + 0.05);
        let settled = t0 + 0.05 + 2.5;
        rig.tick(settled);
        assert!(rig.viewer.is_open(), "viewer did not settle open");
        settled
    }

    #[test]
    fn constructor_rejects_empty_galleries() {
        let err = Viewer::new(
            Vec::new(),
            ViewerConfig::default(),
            Capability::full(),
            Box::new(HeadlessFactory::new()),
            Box::new(ManualDecoder(Rc::new(RefCell::new(ManualState::default())))),
        );
        assert!(err.is_err());
    }

    #[test]
    fn open_waits_for_decode_then_tweens() {
        let mut rig = Rig::new(3, Capability::full(), quick_config());
        rig.viewer.open(1, rig.origins[1].unwrap(), viewport(), 0.0);
        assert!(rig.viewer.is_animating());
        assert!(rig.viewer.chrome().overlay_visible);
        assert!(!rig.viewer.chrome().controls_enabled);
        assert!(rig.viewer.draw_params(0.0).is_none(), "nothing to draw before decode");

        rig.deliver_ok(0.1);
        assert!(rig.viewer.draw_params(0.1).is_some());
        rig.tick(1.0);
        assert!(rig.viewer.is_animating());
        let mid = rig.viewer.draw_params(1.0).unwrap();
        assert!(mid.progress > 0.0 && mid.progress < 1.0);

        rig.tick(2.2);
        assert!(rig.viewer.is_open());
        assert_eq!(rig.viewer.current_index(), Some(1));
        let done = rig.viewer.draw_params(2.2).unwrap();
        assert_eq!(done.progress, 1.0);
        assert_eq!(done.sprite_opacity, 0.0, "sprites must not render when settled");
        assert_eq!(done.plane_opacity, 1.0);
        assert!(rig.viewer.chrome().controls_enabled);
        assert_eq!(rig.viewer.chrome().counter, "2 / 3");
    }

    #[test]
    fn full_scenario_open_next_close() {
        let mut rig = Rig::new(3, Capability::full(), quick_config());
        let t_open = open_fully(&mut rig, 1, 0.0);

        rig.viewer.next(t_open);
        assert!(rig.viewer.is_animating());
        rig.deliver_ok(t_open + 0.1);

        // mid-dispersion: morphing and crossfading
        rig.tick(t_open + 0.5);
        let p = rig.viewer.draw_params(t_open + 0.5).unwrap();
        assert!(p.dispersion > 0.0);
        assert!(p.texture_mix > 0.0);

        // dispersion stage completes, swap committed
        rig.tick(t_open + 0.1 + MORPH_STAGE_SECS as f64 + 0.01);
        assert_eq!(rig.viewer.current_index(), Some(2));
        let p = rig
            .viewer
            .draw_params(t_open + 0.1 + MORPH_STAGE_SECS as f64 + 0.01)
            .unwrap();
        assert_eq!(p.texture_mix, 0.0);

        // reassembly completes
        let t_settled = t_open + 0.1 + 2.0 * MORPH_STAGE_SECS as f64 + 0.05;
        rig.tick(t_settled);
        assert!(rig.viewer.is_open());
        let p = rig.viewer.draw_params(t_settled).unwrap();
        assert_eq!(p.dispersion, 0.0);
        assert_eq!(p.texture_mix, 0.0);
        assert_eq!(p.plane_opacity, 1.0);

        // close returns focus to the item we navigated to
        rig.viewer.close(t_settled);
        rig.tick(t_settled + 1.3);
        assert!(!rig.viewer.chrome().overlay_visible);
        assert_eq!(rig.viewer.chrome_mut().take_focus_return(), Some(2));
        assert_eq!(rig.ledger.outstanding(), 0, "close must release the session");
    }

    #[test]
    fn requests_while_animating_are_rejected() {
        let mut rig = Rig::new(3, Capability::full(), quick_config());
        rig.viewer.open(0, rig.origins[0].unwrap(), viewport(), 0.0);
        let requests_before = rig.state.borrow().requests.len();

        // second open while loading: ignored
        rig.viewer.open(1, rig.origins[1].unwrap(), viewport(), 0.1);
        assert_eq!(rig.state.borrow().requests.len(), requests_before);

        rig.deliver_ok(0.2);
        rig.tick(0.5); // still opening
        rig.viewer.next(0.5);
        rig.viewer.goto_index(2, 0.5);
        assert_eq!(rig.state.borrow().requests.len(), requests_before);
        assert!(rig.viewer.is_animating());
    }

    #[test]
    fn navigation_preconditions() {
        let mut rig = Rig::new(1, Capability::full(), quick_config());
        open_fully(&mut rig, 0, 0.0);
        let requests = rig.state.borrow().requests.len();
        rig.viewer.next(10.0); // single image: nowhere to go
        rig.viewer.prev(10.0);
        assert_eq!(rig.state.borrow().requests.len(), requests);
        assert!(rig.viewer.is_open());

        let mut rig = Rig::new(4, Capability::full(), quick_config());
        open_fully(&mut rig, 2, 0.0);
        let requests = rig.state.borrow().requests.len();
        rig.viewer.goto_index(2, 10.0); // same index
        assert_eq!(rig.state.borrow().requests.len(), requests);
    }

    #[test]
    fn index_wraps_modulo_item_count() {
        let mut rig = Rig::new(3, Capability::full(), quick_config());
        let t = open_fully(&mut rig, 2, 0.0);
        rig.viewer.next(t);
        let target = rig.state.borrow().requests.last().unwrap().index;
        assert_eq!(target, 0);

        let mut rig = Rig::new(3, Capability::full(), quick_config());
        let t = open_fully(&mut rig, 0, 0.0);
        rig.viewer.prev(t);
        let target = rig.state.borrow().requests.last().unwrap().index;
        assert_eq!(target, 2);
    }

    #[test]
    fn close_when_idle_is_a_noop() {
        let mut rig = Rig::new(2, Capability::full(), quick_config());
        rig.viewer.close(0.0);
        assert!(!rig.viewer.is_animating());
        assert!(!rig.viewer.chrome().overlay_visible);
        assert_eq!(rig.ledger.outstanding(), 0);
    }

    #[test]
    fn close_during_opening_cancels_immediately() {
        let mut rig = Rig::new(2, Capability::full(), quick_config());
        rig.viewer.open(1, rig.origins[1].unwrap(), viewport(), 0.0);
        rig.deliver_ok(0.1);
        rig.tick(0.5);
        assert!(rig.viewer.is_animating());

        rig.viewer.close(0.6);
        // terminal side effects land synchronously, no limbo
        assert!(!rig.viewer.is_animating());
        assert!(!rig.viewer.chrome().overlay_visible);
        assert_eq!(rig.viewer.chrome_mut().take_focus_return(), Some(1));
        assert_eq!(rig.ledger.outstanding(), 0);
    }

    #[test]
    fn stale_decode_results_are_ignored() {
        let mut rig = Rig::new(2, Capability::full(), quick_config());
        rig.viewer.open(0, rig.origins[0].unwrap(), viewport(), 0.0);
        let stale_epoch = rig.state.borrow().requests.last().unwrap().epoch;
        rig.viewer.close(0.1); // cancels the pending open, bumps the epoch

        rig.deliver(stale_epoch, 0, Ok(DecodedImage::solid(8, 8, [0, 0, 0, 255])), 0.2);
        assert!(!rig.viewer.chrome().overlay_visible);
        assert!(rig.viewer.draw_params(0.2).is_none());
        assert_eq!(rig.ledger.outstanding(), 0);
    }

    #[test]
    fn failed_open_returns_to_idle() {
        let mut rig = Rig::new(2, Capability::full(), quick_config());
        rig.viewer.open(0, rig.origins[0].unwrap(), viewport(), 0.0);
        let epoch = rig.state.borrow().requests.last().unwrap().epoch;
        rig.deliver(epoch, 0, Err(anyhow::anyhow!("corrupt file")), 0.1);

        assert!(!rig.viewer.is_animating());
        assert!(!rig.viewer.chrome().overlay_visible);
        assert!(rig.viewer.chrome_mut().take_error().is_some());
        assert_eq!(rig.ledger.outstanding(), 0);
        // and the viewer is still usable
        open_fully(&mut rig, 1, 1.0);
    }

    #[test]
    fn failed_navigation_keeps_the_current_image() {
        let mut rig = Rig::new(3, Capability::full(), quick_config());
        let t = open_fully(&mut rig, 0, 0.0);
        let before = rig.ledger.outstanding();

        rig.viewer.next(t);
        let epoch = rig.state.borrow().requests.last().unwrap().epoch;
        rig.deliver(epoch, 1, Err(anyhow::anyhow!("truncated")), t + 0.1);

        assert!(rig.viewer.is_open());
        assert_eq!(rig.viewer.current_index(), Some(0));
        assert!(rig.viewer.chrome().controls_enabled);
        assert!(rig.viewer.chrome_mut().take_error().is_some());
        assert_eq!(rig.ledger.outstanding(), before, "no leaked guards");
    }

    #[test]
    fn reduced_motion_runs_all_side_effects_synchronously() {
        let mut rig = Rig::new(3, Capability::reduced(), quick_config());
        let t0 = 5.0;
        rig.viewer.open(1, rig.origins[1].unwrap(), viewport(), t0);
        rig.deliver_ok(t0); // same instant: zero elapsed animation time
        assert!(rig.viewer.is_open());
        assert!(rig.viewer.chrome().overlay_visible);
        assert!(rig.viewer.chrome().controls_enabled);
        let p = rig.viewer.draw_params(t0).unwrap();
        assert_eq!(p.progress, 1.0);
        assert_eq!(p.sprite_opacity, 0.0);

        // navigation swaps instantly
        rig.viewer.next(t0);
        rig.deliver_ok(t0);
        assert!(rig.viewer.is_open());
        assert_eq!(rig.viewer.current_index(), Some(2));
        let p = rig.viewer.draw_params(t0).unwrap();
        assert_eq!(p.dispersion, 0.0);
        assert_eq!(p.texture_mix, 0.0);

        // close lands in the same final chrome state as the animated path
        rig.viewer.close(t0);
        assert!(!rig.viewer.chrome().overlay_visible);
        assert_eq!(rig.viewer.chrome_mut().take_focus_return(), Some(2));
        assert_eq!(rig.ledger.outstanding(), 0);
    }

    #[test]
    fn resize_preserves_particle_identity() {
        let mut rig = Rig::new(2, Capability::full(), quick_config());
        open_fully(&mut rig, 0, 0.0);
        let before: Vec<_> = rig
            .viewer
            .session
            .as_ref()
            .unwrap()
            .field
            .attrs
            .iter()
            .map(|a| (a.curve_offset, a.delay, a.seed))
            .collect();

        // shrink the window
        rig.viewer.tick(10.0, rect(0.0, 0.0, 1280.0, 720.0), &rig.origins);
        let session = rig.viewer.session.as_ref().unwrap();
        for (a, b) in session.field.attrs.iter().zip(&before) {
            assert_eq!((a.curve_offset, a.delay, a.seed), *b);
        }
        // plane refit against the new viewport
        assert!(session.field.plane[0] <= 1280.0);
    }

    #[test]
    fn destroy_releases_everything_after_any_interleaving() {
        let mut rig = Rig::new(4, Capability::full(), quick_config());
        let t = open_fully(&mut rig, 0, 0.0);
        rig.viewer.next(t);
        rig.deliver_ok(t + 0.1);
        rig.tick(t + 0.5); // mid-dispersion
        assert!(rig.ledger.outstanding() > 0);

        rig.viewer.destroy();
        assert_eq!(rig.ledger.outstanding(), 0);
        assert!(!rig.viewer.is_animating());
        assert!(!rig.viewer.chrome().overlay_visible);

        // a destroyed viewer re-opens with fresh handles
        open_fully(&mut rig, 2, t + 10.0);
        assert_eq!(rig.ledger.snapshot(), (1, 1, 1));
        rig.viewer.destroy();
        assert_eq!(rig.ledger.outstanding(), 0);
    }

    #[test]
    fn zero_duration_close_still_runs_side_effects() {
        let cfg = ViewerConfig {
            open_duration: 0.0,
            close_duration: 0.0,
            ..quick_config()
        };
        let mut rig = Rig::new(2, Capability::full(), cfg);
        rig.viewer.open(0, rig.origins[0].unwrap(), viewport(), 0.0);
        rig.deliver_ok(0.0);
        assert!(rig.viewer.is_open());
        rig.viewer.close(0.0);
        assert!(!rig.viewer.chrome().overlay_visible);
        assert_eq!(rig.viewer.chrome_mut().take_focus_return(), Some(0));
        assert_eq!(rig.ledger.outstanding(), 0);
    }
}
