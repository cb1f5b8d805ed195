use super::easing::{self, Easing};

/// A wall-clock scalar tween. `now` values come from egui's input time, so
/// animation duration is invariant to frame rate; a zero duration is a valid
/// input and completes on the first sample.
#[derive(Clone, Copy, Debug)]
pub struct Tween {
    from: f32,
    to: f32,
    start: f64,
    duration: f32,
    easing: Easing,
}

impl Tween {
    pub fn new(from: f32, to: f32, start: f64, duration: f32, easing: Easing) -> Self {
        Self {
            from,
            to,
            start,
            duration: duration.max(0.0),
            easing,
        }
    }

    /// Normalized elapsed time, clamped to 0..1.
    pub fn raw_t(&self, now: f64) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (((now - self.start) as f32) / self.duration).clamp(0.0, 1.0)
    }

    /// Eased value at `now`.
    pub fn sample(&self, now: f64) -> f32 {
        let t = easing::evaluate(self.raw_t(now), self.easing);
        self.from + (self.to - self.from) * t
    }

    pub fn finished(&self, now: f64) -> bool {
        self.raw_t(now) >= 1.0
    }
}
