//! Text-to-speech request execution
//!
//! [`SpeechService::render`] turns one resolved request into WAV bytes:
//! instance lookup, speaker validation, synthesis into a temporary file and
//! read-back. Synthesis and instance construction (which may warm the engine
//! up on the device) share one semaphore so that a single accelerator is not
//! oversubscribed by concurrent requests.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::device::DeviceSelection;
use super::instance_cache::{CacheError, InstanceCache};
use super::synthesis::{SynthesisError, SynthesizerFactory};

/// Fully resolved parameters of one synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisParams {
    pub text: String,
    pub speed: f32,
    pub language: String,
    pub speaker_id: String,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(
        "Speaker ID '{speaker_id}' not available for language '{language}'. Available speakers: {available:?}"
    )]
    InvalidSpeaker {
        speaker_id: String,
        language: String,
        available: Vec<String>,
    },

    #[error("Failed to initialize TTS model: {0}")]
    ModelInit(String),

    #[error("TTS generation failed: {0}")]
    Generation(String),
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        ServiceError::ModelInit(err.to_string())
    }
}

impl From<SynthesisError> for ServiceError {
    fn from(err: SynthesisError) -> Self {
        ServiceError::Generation(err.to_string())
    }
}

/// Renders speech on the process-wide device selection.
pub struct SpeechService {
    selection: DeviceSelection,
    cache: InstanceCache,
    permits: Arc<Semaphore>,
}

impl SpeechService {
    pub fn new(
        selection: DeviceSelection,
        factory: Arc<dyn SynthesizerFactory>,
        max_concurrent_synthesis: usize,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(max_concurrent_synthesis.max(1)));
        Self {
            selection,
            cache: InstanceCache::new(factory).with_permits(Arc::clone(&permits)),
            permits,
        }
    }

    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }

    /// Number of constructed inference instances.
    pub async fn models_cached(&self) -> u64 {
        self.cache.cached_count().await
    }

    /// Render `params` to WAV bytes.
    pub async fn render(&self, params: &SynthesisParams) -> Result<Vec<u8>, ServiceError> {
        let instance = self
            .cache
            .get_instance(&params.language, &self.selection)
            .await?;

        let speakers = instance.speaker_table();
        let speaker = match speakers.get(&params.speaker_id) {
            Some(id) => *id,
            None => {
                return Err(ServiceError::InvalidSpeaker {
                    speaker_id: params.speaker_id.clone(),
                    language: params.language.clone(),
                    available: speakers.keys().cloned().collect(),
                });
            }
        };

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ServiceError::Generation(e.to_string()))?;

        let output = tempfile::Builder::new()
            .prefix("tts-")
            .suffix(".wav")
            .tempfile()
            .map_err(SynthesisError::from)?;

        debug!(
            language = %params.language,
            speaker = %params.speaker_id,
            device = %instance.device(),
            "Synthesizing"
        );
        instance
            .synthesize(&params.text, speaker, output.path(), params.speed)
            .await?;

        let audio = tokio::fs::read(output.path())
            .await
            .map_err(SynthesisError::from)?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyOutput.into());
        }

        info!(
            language = %params.language,
            bytes = audio.len(),
            device = %instance.device(),
            "Speech synthesized"
        );
        Ok(audio)
    }
}
