//! Startup helpers that run before the async runtime exists.
//!
//! The accelerator driver stack reads a handful of environment variables when
//! it is first loaded. They are exported here, then the device is probed once;
//! the resulting [`DeviceSelection`] is fixed for the life of the process.
//!
//! ```text
//! $ xpu-tts-gateway probe
//! ```

use std::env;

use tracing::{debug, info};

use crate::config::AcceleratorConfig;
use crate::core::accelerator::LevelZeroRuntime;
use crate::core::device::{AcceleratorRuntime, DeviceProber, DeviceSelection};

/// Driver environment variables derived from the accelerator configuration.
pub fn accelerator_hints(config: &AcceleratorConfig) -> Vec<(&'static str, &str)> {
    [
        ("ONEAPI_DEVICE_SELECTOR", config.device_selector.as_deref()),
        ("ZE_AFFINITY_MASK", config.affinity_mask.as_deref()),
        ("LIBVA_DRIVER_NAME", config.va_driver_name.as_deref()),
        ("LIBVA_DRIVERS_PATH", config.va_drivers_path.as_deref()),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.map(|v| (key, v)))
    .collect()
}

/// Export driver hints that are not already set in the environment.
///
/// Must be called while the process is still single-threaded (before the
/// tokio runtime is built). Returns the names of the variables it set.
pub fn apply_accelerator_hints(config: &AcceleratorConfig) -> Vec<&'static str> {
    let mut applied = Vec::new();
    for (key, value) in accelerator_hints(config) {
        if env::var_os(key).is_some() {
            debug!(key, "Accelerator hint already set, keeping existing value");
            continue;
        }
        // SAFETY: no other threads exist yet, see the function docs.
        unsafe {
            env::set_var(key, value);
        }
        debug!(key, value, "Accelerator hint set");
        applied.push(key);
    }
    applied
}

/// Probe the Level Zero runtime once and decide the process device.
pub fn select_device(config: &AcceleratorConfig) -> DeviceSelection {
    select_device_with(LevelZeroRuntime::new(config.loader_library.clone()), config)
}

/// [`select_device`] with an explicit runtime.
pub fn select_device_with<R: AcceleratorRuntime>(
    runtime: R,
    config: &AcceleratorConfig,
) -> DeviceSelection {
    let selection = DeviceProber::new(runtime)
        .with_enabled(config.enabled)
        .with_smoke_test(config.smoke_test)
        .probe();

    info!(
        device = %selection.kind,
        accelerator = selection.name.as_deref().unwrap_or("none"),
        "Device selected"
    );
    selection
}
