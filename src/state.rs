use std::sync::Arc;

use tracing::info;

use crate::config::{DEFAULT_SYNTH_COMMAND, ServerConfig};
use crate::core::device::DeviceSelection;
use crate::core::service::SpeechService;
use crate::core::synthesis::{CommandSynthesizerFactory, EngineCommand, SynthesizerFactory};

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    pub speech: SpeechService,
}

impl AppState {
    /// Build the state around the configured command-line engine.
    pub fn new(config: ServerConfig, selection: DeviceSelection) -> Arc<Self> {
        // Blank commands are rejected by config validation
        let engine = EngineCommand::parse(&config.synthesizer.command).unwrap_or(EngineCommand {
            program: DEFAULT_SYNTH_COMMAND.to_string(),
            args: Vec::new(),
        });
        info!(engine = %engine, "Using command-line TTS engine");

        let factory = CommandSynthesizerFactory::new(engine)
            .with_warmup_text(config.synthesizer.warmup_text.clone());

        Self::with_factory(config, selection, Arc::new(factory))
    }

    /// Build the state around any synthesizer factory.
    pub fn with_factory(
        config: ServerConfig,
        selection: DeviceSelection,
        factory: Arc<dyn SynthesizerFactory>,
    ) -> Arc<Self> {
        let speech = SpeechService::new(selection, factory, config.max_concurrent_synthesis);
        Arc::new(Self { config, speech })
    }

    /// Device decided at startup
    pub fn selection(&self) -> &DeviceSelection {
        self.speech.selection()
    }
}
