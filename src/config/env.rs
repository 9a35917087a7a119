use std::env;
use std::str::FromStr;

use super::{AcceleratorConfig, ServerConfig, SynthesizerConfig};

/// Every environment variable read by [`load_from_env`]
#[cfg(test)]
pub(crate) const ALL_KEYS: [&str; 16] = [
    "HOST",
    "PORT",
    "DEFAULT_SPEED",
    "DEFAULT_LANGUAGE",
    "DEFAULT_SPEAKER_ID",
    "ACCELERATOR_ENABLED",
    "ACCELERATOR_SMOKE_TEST",
    "LEVEL_ZERO_LOADER",
    "ACCELERATOR_DEVICE_SELECTOR",
    "ACCELERATOR_AFFINITY_MASK",
    "ACCELERATOR_VA_DRIVER_NAME",
    "ACCELERATOR_VA_DRIVERS_PATH",
    "SYNTH_COMMAND",
    "SYNTH_WARMUP_TEXT",
    "MAX_CONCURRENT_SYNTHESIS",
    "CORS_ALLOWED_ORIGINS",
];

/// Build a configuration from environment variables, falling back to defaults.
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let defaults = ServerConfig::default();
    let accelerator_defaults = AcceleratorConfig::default();

    let accelerator = AcceleratorConfig {
        enabled: parse_bool("ACCELERATOR_ENABLED", accelerator_defaults.enabled)?,
        smoke_test: parse_bool("ACCELERATOR_SMOKE_TEST", accelerator_defaults.smoke_test)?,
        loader_library: string_or("LEVEL_ZERO_LOADER", accelerator_defaults.loader_library),
        device_selector: hint(
            "ACCELERATOR_DEVICE_SELECTOR",
            accelerator_defaults.device_selector,
        ),
        affinity_mask: hint("ACCELERATOR_AFFINITY_MASK", accelerator_defaults.affinity_mask),
        va_driver_name: hint("ACCELERATOR_VA_DRIVER_NAME", accelerator_defaults.va_driver_name),
        va_drivers_path: hint(
            "ACCELERATOR_VA_DRIVERS_PATH",
            accelerator_defaults.va_drivers_path,
        ),
    };

    let synthesizer = SynthesizerConfig {
        command: string_or("SYNTH_COMMAND", defaults.synthesizer.command),
        warmup_text: hint("SYNTH_WARMUP_TEXT", defaults.synthesizer.warmup_text),
    };

    Ok(ServerConfig {
        host: string_or("HOST", defaults.host),
        port: parse_or("PORT", defaults.port)?,
        default_speed: parse_or("DEFAULT_SPEED", defaults.default_speed)?,
        default_language: string_or("DEFAULT_LANGUAGE", defaults.default_language),
        default_speaker_id: string_or("DEFAULT_SPEAKER_ID", defaults.default_speaker_id),
        accelerator,
        synthesizer,
        max_concurrent_synthesis: parse_or(
            "MAX_CONCURRENT_SYNTHESIS",
            defaults.max_concurrent_synthesis,
        )?,
        cors_allowed_origins: optional("CORS_ALLOWED_ORIGINS"),
    })
}

/// Non-blank value of `key`
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn string_or(key: &str, default: String) -> String {
    optional(key).unwrap_or(default)
}

/// Unset keeps the default, an empty value disables the setting.
fn hint(key: &str, default: Option<String>) -> Option<String> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => None,
        Ok(value) => Some(value),
        Err(_) => default,
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| format!("Invalid value for {key}: '{value}' ({e})").into()),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, default: bool) -> Result<bool, Box<dyn std::error::Error>> {
    match optional(key) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(format!("Invalid boolean for {key}: '{value}'").into()),
        },
        None => Ok(default),
    }
}
