use serde::{Deserialize, Serialize};

/// Easing kinds used by the viewer's tweens.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Easing {
    Linear,
    /// progress = 1 - (1-t)^4. The open/close ramp.
    QuartOut,
    /// Hermite 3t^2 - 2t^3 over the whole interval.
    Smooth,
}

/// Convert a normalized time `t` (0..1) into eased progress.
pub fn evaluate(t: f32, easing: Easing) -> f32 {
    let t = t.clamp(0.0, 1.0);
    match easing {
        Easing::Linear => t,
        Easing::QuartOut => 1.0 - (1.0 - t).powi(4),
        Easing::Smooth => smoothstep(0.0, 1.0, t),
    }
}

/// Classic GLSL smoothstep, also used by the trajectory math so the CPU and
/// WGSL sides agree on phase windows.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_exact() {
        for e in [Easing::Linear, Easing::QuartOut, Easing::Smooth] {
            assert_eq!(evaluate(0.0, e), 0.0);
            assert_eq!(evaluate(1.0, e), 1.0);
        }
    }

    #[test]
    fn quart_out_front_loads_motion() {
        // most of the distance is covered in the first half
        assert!(evaluate(0.5, Easing::QuartOut) > 0.9);
    }

    #[test]
    fn out_of_range_input_is_clamped() {
        assert_eq!(evaluate(-2.0, Easing::QuartOut), 0.0);
        assert_eq!(evaluate(3.0, Easing::QuartOut), 1.0);
        assert_eq!(smoothstep(0.2, 0.8, 0.0), 0.0);
        assert_eq!(smoothstep(0.2, 0.8, 1.0), 1.0);
    }
}
