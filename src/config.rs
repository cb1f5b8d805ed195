use serde::{Deserialize, Serialize};

use crate::capability::Capability;

/// Viewer tuning, immutable once resolved against the capability record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Grid resolution per axis; the field has (segments+1)^2 particles.
    pub segments: u32,
    /// View-fit headroom multiplier (fraction of the viewport the settled
    /// image may occupy).
    pub padding: f32,
    /// Seconds. Forced to 0 under reduced motion.
    pub open_duration: f32,
    pub close_duration: f32,
    /// Fraction of open progress at which the sprite cloud starts
    /// crossfading into the textured plane.
    pub crossfade_start: f32,
    /// Manifest key naming the full-resolution source, with fallback to
    /// "src" for items that only carry the standard source.
    pub source_key: String,
    /// Sprite size in physical pixels at full growth.
    pub point_size: f32,
    pub max_visible_dots: usize,
}

/// Grid resolution on machines where the full field is too heavy.
pub const SEGMENTS_CONSTRAINED: u32 = 64;

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            segments: 128,
            padding: 0.88,
            open_duration: 1.2,
            close_duration: 0.9,
            crossfade_start: 0.65,
            source_key: "full".to_string(),
            point_size: 6.0,
            max_visible_dots: 7,
        }
    }
}

impl ViewerConfig {
    /// Apply the capability decision and clamp every field to a sane range.
    pub fn resolve(mut self, caps: &Capability) -> Self {
        if caps.reduced_motion {
            self.open_duration = 0.0;
            self.close_duration = 0.0;
        }
        if caps.low_power || caps.narrow_screen {
            self.segments = self.segments.min(SEGMENTS_CONSTRAINED);
        }
        self.segments = self.segments.clamp(8, 256);
        self.padding = self.padding.clamp(0.1, 1.0);
        self.open_duration = self.open_duration.max(0.0);
        self.close_duration = self.close_duration.max(0.0);
        self.crossfade_start = self.crossfade_start.clamp(0.0, 0.99);
        self.point_size = self.point_size.clamp(1.0, 64.0);
        self.max_visible_dots = self.max_visible_dots.max(1);
        self
    }
}
