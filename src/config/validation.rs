use super::ServerConfig;
use crate::core::synthesis::{EngineCommand, SUPPORTED_LANGUAGES};

/// Run every check against a merged configuration.
pub(super) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_port(config.port)?;
    validate_speed(config.default_speed)?;
    validate_language(&config.default_language)?;
    validate_max_concurrent(config.max_concurrent_synthesis)?;
    validate_command(&config.synthesizer.command)?;
    Ok(())
}

fn validate_port(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    if port == 0 {
        return Err("PORT must be between 1 and 65535".into());
    }
    Ok(())
}

fn validate_speed(speed: f32) -> Result<(), Box<dyn std::error::Error>> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(format!("DEFAULT_SPEED must be a positive number, got {speed}").into());
    }
    Ok(())
}

fn validate_language(language: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !SUPPORTED_LANGUAGES.contains(&language) {
        return Err(format!(
            "DEFAULT_LANGUAGE '{language}' is not supported (expected one of {})",
            SUPPORTED_LANGUAGES.join(", ")
        )
        .into());
    }
    Ok(())
}

fn validate_max_concurrent(max: usize) -> Result<(), Box<dyn std::error::Error>> {
    if max == 0 {
        return Err("MAX_CONCURRENT_SYNTHESIS must be at least 1".into());
    }
    Ok(())
}

fn validate_command(command: &str) -> Result<(), Box<dyn std::error::Error>> {
    if EngineCommand::parse(command).is_none() {
        return Err("SYNTH_COMMAND must not be empty".into());
    }
    Ok(())
}
