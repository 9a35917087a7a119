//! Configuration module for the TTS gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use xpu_tts_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod merge;
mod validation;
mod yaml;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SPEED: f32 = 1.0;
pub const DEFAULT_LANGUAGE: &str = "EN";
pub const DEFAULT_SPEAKER_ID: &str = "EN-Default";
pub const DEFAULT_SYNTH_COMMAND: &str = "melo";
pub const DEFAULT_SYNTH_WARMUP_TEXT: &str = "Hello.";
pub const DEFAULT_MAX_CONCURRENT_SYNTHESIS: usize = 1;

pub const DEFAULT_DEVICE_SELECTOR: &str = "level_zero:gpu";
pub const DEFAULT_AFFINITY_MASK: &str = "0";
pub const DEFAULT_VA_DRIVER_NAME: &str = "iHD";
pub const DEFAULT_VA_DRIVERS_PATH: &str = "/usr/lib/x86_64-linux-gnu/dri";

/// Accelerator probing settings
///
/// The `Option<String>` fields are driver environment hints exported before
/// probing. `None` means the hint is not exported.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceleratorConfig {
    /// Probe for the accelerator at all (default: true)
    pub enabled: bool,
    /// Run the context create/destroy smoke test (default: true)
    pub smoke_test: bool,
    /// Level Zero loader library name or path
    pub loader_library: String,
    pub device_selector: Option<String>,
    pub affinity_mask: Option<String>,
    pub va_driver_name: Option<String>,
    pub va_drivers_path: Option<String>,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smoke_test: true,
            loader_library: crate::core::accelerator::DEFAULT_LOADER_LIBRARY.to_string(),
            device_selector: Some(DEFAULT_DEVICE_SELECTOR.to_string()),
            affinity_mask: Some(DEFAULT_AFFINITY_MASK.to_string()),
            va_driver_name: Some(DEFAULT_VA_DRIVER_NAME.to_string()),
            va_drivers_path: Some(DEFAULT_VA_DRIVERS_PATH.to_string()),
        }
    }
}

/// Inference engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizerConfig {
    /// Engine command line, split on whitespace (default: `melo`)
    pub command: String,
    /// Text rendered once per new instance to validate the device
    /// (default: `Hello.`, `None` skips the warm-up)
    pub warmup_text: Option<String>,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_SYNTH_COMMAND.to_string(),
            warmup_text: Some(DEFAULT_SYNTH_WARMUP_TEXT.to_string()),
        }
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port)
/// - Request defaults (speed, language, speaker)
/// - Accelerator probing and driver hints
/// - Inference engine command and concurrency
/// - Security settings (CORS)
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Request defaults
    pub default_speed: f32,
    pub default_language: String,
    pub default_speaker_id: String,

    pub accelerator: AcceleratorConfig,
    pub synthesizer: SynthesizerConfig,

    /// Maximum number of syntheses running at once
    /// Default: 1 (a single accelerator is not shared between requests)
    pub max_concurrent_synthesis: usize,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            default_speed: DEFAULT_SPEED,
            default_language: DEFAULT_LANGUAGE.to_string(),
            default_speaker_id: DEFAULT_SPEAKER_ID.to_string(),
            accelerator: AcceleratorConfig::default(),
            synthesizer: SynthesizerConfig::default(),
            max_concurrent_synthesis: DEFAULT_MAX_CONCURRENT_SYNTHESIS,
            cors_allowed_origins: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// The `.env` file is loaded in `main.rs` before this is called, so its
    /// values are visible here as regular environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
