pub mod config;
pub mod core;
pub mod errors;
pub mod handlers;
pub mod init;
pub mod routes;
pub mod server;
pub mod state;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use crate::core::{DeviceKind, DeviceSelection, SpeechService, SynthesisParams};
pub use errors::app_error::{AppError, AppResult};
pub use state::AppState;
