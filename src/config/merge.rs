use super::ServerConfig;
use super::env::load_from_env;
use super::yaml::YamlConfig;

/// Environment configuration with YAML values layered on top.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;
    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml);
    }
    Ok(config)
}

fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) {
    if let Some(server) = yaml.server {
        set(&mut config.host, server.host);
        set(&mut config.port, server.port);
    }

    if let Some(defaults) = yaml.defaults {
        set(&mut config.default_speed, defaults.speed);
        set(&mut config.default_language, defaults.language);
        set(&mut config.default_speaker_id, defaults.speaker_id);
    }

    if let Some(accelerator) = yaml.accelerator {
        let target = &mut config.accelerator;
        set(&mut target.enabled, accelerator.enabled);
        set(&mut target.smoke_test, accelerator.smoke_test);
        set(&mut target.loader_library, accelerator.loader_library);
        set_hint(&mut target.device_selector, accelerator.device_selector);
        set_hint(&mut target.affinity_mask, accelerator.affinity_mask);
        set_hint(&mut target.va_driver_name, accelerator.va_driver_name);
        set_hint(&mut target.va_drivers_path, accelerator.va_drivers_path);
    }

    if let Some(synthesizer) = yaml.synthesizer {
        set(&mut config.synthesizer.command, synthesizer.command);
        if let Some(text) = synthesizer.warmup_text {
            config.synthesizer.warmup_text = Some(text).filter(|t| !t.trim().is_empty());
        }
        set(&mut config.max_concurrent_synthesis, synthesizer.max_concurrent);
    }

    if let Some(origins) = yaml.security.and_then(|s| s.cors_allowed_origins) {
        config.cors_allowed_origins = Some(origins).filter(|o| !o.trim().is_empty());
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// A present but empty hint disables it.
fn set_hint(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        *target = Some(value).filter(|v| !v.trim().is_empty());
    }
}
