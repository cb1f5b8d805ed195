pub mod easing;
pub mod tween;

// Re-exports for convenience
pub use easing::Easing;
pub use tween::Tween;
