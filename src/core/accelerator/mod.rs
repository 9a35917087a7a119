//! Accelerator runtime bindings
//!
//! The prober in [`crate::core::device`] only talks to the
//! [`AcceleratorRuntime`](crate::core::device::AcceleratorRuntime) trait. This
//! module provides the concrete runtime for Intel GPUs: the Level Zero loader
//! library, opened at runtime so that the gateway binary starts (and falls
//! back to CPU) on machines without the driver stack installed.
//!
//! # Feature Flag
//!
//! The real binding requires the `level-zero` feature (enabled by default).
//! When disabled, a stub runtime is used that always reports the extension as
//! unavailable.

#[cfg(feature = "level-zero")]
pub mod level_zero;

#[cfg(not(feature = "level-zero"))]
mod stub;

#[cfg(feature = "level-zero")]
pub use level_zero::LevelZeroRuntime;

#[cfg(not(feature = "level-zero"))]
pub use stub::LevelZeroRuntime;

/// Default name of the Level Zero loader library.
pub const DEFAULT_LOADER_LIBRARY: &str = "libze_loader.so.1";
