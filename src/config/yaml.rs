use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file take precedence over environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///
/// defaults:
///   speed: 1.0
///   language: "EN"
///   speaker_id: "EN-Default"
///
/// accelerator:
///   enabled: true
///   smoke_test: true
///   loader_library: "libze_loader.so.1"
///   device_selector: "level_zero:gpu"
///   affinity_mask: "0"
///   va_driver_name: "iHD"
///   va_drivers_path: "/usr/lib/x86_64-linux-gnu/dri"
///
/// synthesizer:
///   command: "melo"
///   warmup_text: "Hello"
///   max_concurrent: 1
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub defaults: Option<DefaultsYaml>,
    pub accelerator: Option<AcceleratorYaml>,
    pub synthesizer: Option<SynthesizerYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Request defaults applied when a field is missing from the body
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DefaultsYaml {
    pub speed: Option<f32>,
    pub language: Option<String>,
    pub speaker_id: Option<String>,
}

/// Accelerator probing and driver environment hints
///
/// An empty string for a hint disables it.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AcceleratorYaml {
    pub enabled: Option<bool>,
    pub smoke_test: Option<bool>,
    pub loader_library: Option<String>,
    pub device_selector: Option<String>,
    pub affinity_mask: Option<String>,
    pub va_driver_name: Option<String>,
    pub va_drivers_path: Option<String>,
}

/// Inference engine command line
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynthesizerYaml {
    pub command: Option<String>,
    pub warmup_text: Option<String>,
    pub max_concurrent: Option<usize>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
