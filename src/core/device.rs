//! Device selection for accelerated inference.
//!
//! The gateway decides once, at startup, whether inference runs on the
//! accelerator (an Intel GPU, exposed to the engine as `xpu`) or on the
//! general-purpose device (`cpu`). Probing is an ordered chain of fallible
//! steps; the first failure anywhere in the chain resolves to the
//! general-purpose device and is never propagated.
//!
//! ```text
//! load extension -> device visible -> read name -> smoke test -> Accelerator
//!        \________________ any failure or panic ______________/ -> GeneralPurpose
//! ```

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::isolation::call_isolated;

/// Device token understood by the inference engine for the accelerator.
pub const ACCELERATOR_TOKEN: &str = "xpu";
/// Device token understood by the inference engine for the CPU.
pub const GENERAL_PURPOSE_TOKEN: &str = "cpu";

/// Kind of execution device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Vendor GPU reached through the accelerator runtime.
    Accelerator,
    /// CPU fallback, always available.
    GeneralPurpose,
}

impl DeviceKind {
    /// Device token passed to the inference engine.
    pub fn token(&self) -> &'static str {
        match self {
            DeviceKind::Accelerator => ACCELERATOR_TOKEN,
            DeviceKind::GeneralPurpose => GENERAL_PURPOSE_TOKEN,
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Process-wide device decision.
///
/// Computed once by [`DeviceProber::probe`] and read (never recomputed) by
/// every request afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSelection {
    pub kind: DeviceKind,
    /// Display name of the accelerator, when one was selected.
    pub name: Option<String>,
}

impl DeviceSelection {
    pub fn general_purpose() -> Self {
        Self {
            kind: DeviceKind::GeneralPurpose,
            name: None,
        }
    }

    pub fn accelerator(name: impl Into<String>) -> Self {
        Self {
            kind: DeviceKind::Accelerator,
            name: Some(name.into()),
        }
    }

    pub fn is_accelerator(&self) -> bool {
        self.kind == DeviceKind::Accelerator
    }
}

/// Reasons the accelerator was not selected.
///
/// These never leave the prober; they only end up in logs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Accelerator probing disabled by configuration")]
    Disabled,

    #[error("Accelerator runtime extension unavailable: {0}")]
    ExtensionUnavailable(String),

    #[error("No accelerator device visible to the runtime")]
    NoDevice,

    #[error("Accelerator runtime call failed: {0}")]
    Runtime(String),

    #[error("Accelerator smoke test failed: {0}")]
    SmokeTest(String),

    #[error("Accelerator runtime panicked during {step}: {message}")]
    Panicked { step: &'static str, message: String },
}

/// Accelerator runtime as seen by the prober.
///
/// `load` must succeed before any other method is meaningful; implementations
/// return [`ProbeError::ExtensionUnavailable`] from the other methods when
/// called on an unloaded runtime.
pub trait AcceleratorRuntime: Send + Sync {
    /// Load the runtime extension (shared library, driver loader, ...).
    fn load(&self) -> Result<(), ProbeError>;

    /// Number of accelerator devices visible to the runtime.
    fn device_count(&self) -> Result<usize, ProbeError>;

    /// Display name of the device at `index`.
    fn device_name(&self, index: usize) -> Result<String, ProbeError>;

    /// Execute a trivial operation on the device to confirm it is usable.
    fn smoke_test(&self, index: usize) -> Result<(), ProbeError>;
}

/// One-shot accelerator prober.
pub struct DeviceProber<R> {
    runtime: R,
    enabled: bool,
    smoke_test: bool,
}

impl<R: AcceleratorRuntime> DeviceProber<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            enabled: true,
            smoke_test: true,
        }
    }

    /// Skip the runtime entirely and always select the general-purpose device.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether the final smoke test step runs.
    pub fn with_smoke_test(mut self, smoke_test: bool) -> Self {
        self.smoke_test = smoke_test;
        self
    }

    /// Decide which device the process uses.
    ///
    /// Never fails: any error or panic in the chain yields
    /// [`DeviceSelection::general_purpose`].
    pub fn probe(&self) -> DeviceSelection {
        match self.probe_accelerator() {
            Ok(selection) => {
                info!(
                    device = %selection.kind,
                    name = selection.name.as_deref().unwrap_or("unknown"),
                    "Using accelerator for inference"
                );
                selection
            }
            Err(ProbeError::Disabled) => {
                info!("Accelerator disabled by configuration, using CPU for inference");
                DeviceSelection::general_purpose()
            }
            Err(e) => {
                warn!(error = %e, "Accelerator not available, using CPU for inference");
                DeviceSelection::general_purpose()
            }
        }
    }

    /// The full chain, short-circuiting on the first failed step.
    pub fn probe_accelerator(&self) -> Result<DeviceSelection, ProbeError> {
        if !self.enabled {
            return Err(ProbeError::Disabled);
        }

        self.load_extension()?;
        let count = self.visible_devices()?;
        let name = self.read_device_name(0)?;
        if self.smoke_test {
            self.run_smoke_test(0)?;
        }

        info!(count, name = %name, "Accelerator probing succeeded");
        Ok(DeviceSelection::accelerator(name))
    }

    pub fn load_extension(&self) -> Result<(), ProbeError> {
        call_isolated("load", || self.runtime.load())?;
        info!("Accelerator runtime extension loaded");
        Ok(())
    }

    pub fn visible_devices(&self) -> Result<usize, ProbeError> {
        let count = call_isolated("device_count", || self.runtime.device_count())?;
        if count == 0 {
            return Err(ProbeError::NoDevice);
        }
        info!(count, "Accelerator devices visible");
        Ok(count)
    }

    pub fn read_device_name(&self, index: usize) -> Result<String, ProbeError> {
        let name = call_isolated("device_name", || self.runtime.device_name(index))?;
        info!(index, name = %name, "Accelerator device detected");
        Ok(name)
    }

    pub fn run_smoke_test(&self, index: usize) -> Result<(), ProbeError> {
        call_isolated("smoke_test", || self.runtime.smoke_test(index))?;
        info!(index, "Accelerator smoke test passed");
        Ok(())
    }
}
