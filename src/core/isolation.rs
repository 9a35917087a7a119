//! Panic isolation for accelerator runtime calls
//!
//! The accelerator runtime is foreign code reached through dynamic loading.
//! Every probing step runs through [`call_isolated`] so that a panic inside a
//! runtime binding is reported as an ordinary [`ProbeError`] and never takes
//! the process down during startup.
//!
//! # Safety Considerations
//!
//! - `catch_unwind` only catches panics, not aborts
//! - The release profile must keep `panic = "unwind"` for this to work

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::device::ProbeError;

/// Run one probing step, converting a panic into [`ProbeError::Panicked`].
///
/// The step's own `Result` is passed through untouched.
pub fn call_isolated<F, T>(step: &'static str, step_fn: F) -> Result<T, ProbeError>
where
    F: FnOnce() -> Result<T, ProbeError>,
{
    // Probing steps only borrow the runtime immutably; a panic leaves no
    // partially-updated state behind that a later step could observe.
    match catch_unwind(AssertUnwindSafe(step_fn)) {
        Ok(result) => result,
        Err(panic_info) => {
            let message = extract_panic_message(&panic_info);
            tracing::error!(step, message = %message, "Accelerator runtime panicked");
            Err(ProbeError::Panicked { step, message })
        }
    }
}

/// Extract a human-readable message from panic info
///
/// Handles the common payload types (`&str`, `String`) and falls back to a
/// generic message.
fn extract_panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (non-string payload)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_isolated_success() {
        let result = call_isolated("count", || Ok::<_, ProbeError>(2usize));
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn test_call_isolated_preserves_error() {
        let result: Result<usize, ProbeError> = call_isolated("count", || Err(ProbeError::NoDevice));
        assert_eq!(result, Err(ProbeError::NoDevice));
    }

    #[test]
    fn test_call_isolated_panic_str() {
        let result: Result<usize, ProbeError> = call_isolated("load", || {
            panic!("driver exploded");
        });
        match result {
            Err(ProbeError::Panicked { step, message }) => {
                assert_eq!(step, "load");
                assert!(message.contains("driver exploded"));
            }
            other => panic!("Expected Panicked error, got: {:?}", other),
        }
    }

    #[test]
    fn test_call_isolated_panic_string() {
        let result: Result<(), ProbeError> = call_isolated("smoke_test", || {
            panic!("{}", format!("device {} lost", 0));
        });
        match result {
            Err(ProbeError::Panicked { message, .. }) => assert_eq!(message, "device 0 lost"),
            other => panic!("Expected Panicked error, got: {:?}", other),
        }
    }

    #[test]
    fn test_extract_panic_message_non_string() {
        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(
            extract_panic_message(&payload),
            "Unknown panic (non-string payload)"
        );
    }
}
