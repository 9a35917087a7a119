//! Stub implementation for when the `level-zero` feature is disabled

use crate::core::device::{AcceleratorRuntime, ProbeError};

const UNAVAILABLE: &str = "built without the `level-zero` feature";

/// Placeholder runtime that never finds an accelerator
pub struct LevelZeroRuntime {
    library: String,
}

impl LevelZeroRuntime {
    /// Create a runtime for the given loader library name (ignored)
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
        }
    }

    /// Loader library name this runtime was configured with
    pub fn library(&self) -> &str {
        &self.library
    }
}

impl AcceleratorRuntime for LevelZeroRuntime {
    fn load(&self) -> Result<(), ProbeError> {
        Err(ProbeError::ExtensionUnavailable(format!(
            "{}: {UNAVAILABLE}",
            self.library
        )))
    }

    fn device_count(&self) -> Result<usize, ProbeError> {
        Err(ProbeError::ExtensionUnavailable(UNAVAILABLE.to_string()))
    }

    fn device_name(&self, _index: usize) -> Result<String, ProbeError> {
        Err(ProbeError::ExtensionUnavailable(UNAVAILABLE.to_string()))
    }

    fn smoke_test(&self, _index: usize) -> Result<(), ProbeError> {
        Err(ProbeError::ExtensionUnavailable(UNAVAILABLE.to_string()))
    }
}
