//! Render-path capability probing.
//!
//! The viewer never derives these decisions itself: it receives a finished
//! `Capability` record. The default probe combines a wgpu adapter check,
//! coarse hardware heuristics and environment overrides; swap in another
//! `CapabilityProbe` implementation to change the policy.

use once_cell::sync::Lazy;

/// Environment override: force the simple (non-animated) viewer.
pub const ENV_FORCE_SIMPLE: &str = "POINTILLIST_SIMPLE";
/// Environment override: keep the animated path but zero all durations,
/// the desktop analog of an OS reduce-motion preference.
pub const ENV_REDUCED_MOTION: &str = "POINTILLIST_REDUCED_MOTION";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderPath {
    /// Particle transition engine.
    Animated,
    /// Plain image swap with a fade.
    Simple,
}

#[derive(Clone, Debug)]
pub struct Capability {
    pub path: RenderPath,
    pub reduced_motion: bool,
    pub low_power: bool,
    pub narrow_screen: bool,
    /// Why this decision was made; logged and shown in diagnostics.
    pub reason: String,
}

impl Capability {
    pub fn animated(&self) -> bool {
        self.path == RenderPath::Animated
    }

    /// A permissive default for tests and headless use.
    pub fn full() -> Self {
        Self {
            path: RenderPath::Animated,
            reduced_motion: false,
            low_power: false,
            narrow_screen: false,
            reason: "assumed".into(),
        }
    }

    pub fn reduced() -> Self {
        Self {
            reduced_motion: true,
            reason: "reduced motion".into(),
            ..Self::full()
        }
    }
}

pub trait CapabilityProbe {
    fn assess(&self) -> Capability;
}

/// Default probe. Hardware-concurrency and memory checks are deliberately
/// coarse and live only here, behind the trait, so a stricter or more
/// privacy-tolerant policy can replace them wholesale.
pub struct SystemProbe;

impl CapabilityProbe for SystemProbe {
    fn assess(&self) -> Capability {
        let mut caps = Capability::full();

        if env_flag(ENV_FORCE_SIMPLE) {
            caps.path = RenderPath::Simple;
            caps.reason = format!("{ENV_FORCE_SIMPLE} set");
            eprintln!("[capability] {}", caps.reason);
            return caps;
        }
        caps.reduced_motion = env_flag(ENV_REDUCED_MOTION);

        if !adapter_available() {
            caps.path = RenderPath::Simple;
            caps.reason = "no compatible graphics adapter".into();
            eprintln!("[capability] {}", caps.reason);
            return caps;
        }

        let (cpus, memory_bytes) = hardware_stats();
        caps.low_power = cpus < 4 || memory_bytes < 4 * 1024 * 1024 * 1024;
        caps.narrow_screen = primary_screen_width().map_or(false, |w| w < 1280);
        caps.reason = format!(
            "adapter ok, {cpus} cpus, {} MB, narrow={}",
            memory_bytes / (1024 * 1024),
            caps.narrow_screen
        );
        eprintln!(
            "[capability] animated path: {} (reduced_motion={}, low_power={})",
            caps.reason, caps.reduced_motion, caps.low_power
        );
        caps
    }
}

/// Probe once per process; the result cannot change mid-run.
pub fn detected() -> Capability {
    static DETECTED: Lazy<Capability> = Lazy::new(|| SystemProbe.assess());
    DETECTED.clone()
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map_or(false, |v| !v.is_empty() && v != "0")
}

fn adapter_available() -> bool {
    let instance = wgpu::Instance::default();
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::LowPower,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .is_some()
}

fn hardware_stats() -> (usize, u64) {
    use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
    let sys = System::new_with_specifics(
        RefreshKind::new()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::new().with_ram()),
    );
    (sys.cpus().len(), sys.total_memory())
}

fn primary_screen_width() -> Option<u32> {
    let displays = display_info::DisplayInfo::all().ok()?;
    displays
        .iter()
        .find(|d| d.is_primary)
        .or_else(|| displays.first())
        .map(|d| d.width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_capability_is_animated() {
        let caps = Capability::full();
        assert!(caps.animated());
        assert!(!caps.reduced_motion);
    }

    #[test]
    fn reduced_keeps_the_animated_path() {
        let caps = Capability::reduced();
        assert!(caps.animated());
        assert!(caps.reduced_motion);
    }

    #[test]
    fn env_flag_semantics() {
        std::env::set_var("POINTILLIST_TEST_FLAG", "1");
        assert!(env_flag("POINTILLIST_TEST_FLAG"));
        std::env::set_var("POINTILLIST_TEST_FLAG", "0");
        assert!(!env_flag("POINTILLIST_TEST_FLAG"));
        std::env::remove_var("POINTILLIST_TEST_FLAG");
        assert!(!env_flag("POINTILLIST_TEST_FLAG"));
    }
}
