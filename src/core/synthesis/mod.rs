//! Inference engine collaborators
//!
//! The speech model itself is external. The gateway only needs two things
//! from it:
//!
//! - a [`SynthesizerFactory`] that constructs an instance for a
//!   `(language, device)` pair (slow: loads weights onto the device), and
//! - a [`Synthesizer`] that renders text into a WAV file for a numeric
//!   speaker id at a given speed.
//!
//! The built-in backend in [`command`] drives an external TTS command line.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::device::DeviceKind;

pub mod command;

pub use command::{CommandSynthesizer, CommandSynthesizerFactory, EngineCommand};

/// Languages with a built-in speaker table.
pub const SUPPORTED_LANGUAGES: [&str; 6] = ["EN", "ES", "FR", "ZH", "JP", "KR"];

/// Speaker identifier → numeric id understood by an instance.
///
/// Ordered so that error messages list speakers deterministically.
pub type SpeakerTable = BTreeMap<String, u32>;

/// Result type for synthesis operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Failures reported by the inference engine
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The engine has no model for this language
    #[error("Unsupported language '{0}'")]
    UnsupportedLanguage(String),

    /// Instance construction failed (weights, device placement, ...)
    #[error("Model construction failed: {0}")]
    Construction(String),

    /// Text-to-audio rendering failed
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    /// Engine produced no audio
    #[error("Synthesis produced no audio")]
    EmptyOutput,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A constructed inference instance for one language on one device.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Language this instance was constructed for
    fn language(&self) -> &str;

    /// Device this instance actually runs on
    fn device(&self) -> DeviceKind;

    /// Speakers this instance can render
    fn speaker_table(&self) -> &SpeakerTable;

    /// Render `text` with `speaker` into a WAV file at `output_path`.
    async fn synthesize(
        &self,
        text: &str,
        speaker: u32,
        output_path: &Path,
        speed: f32,
    ) -> SynthesisResult<()>;
}

/// Constructs inference instances.
#[async_trait]
pub trait SynthesizerFactory: Send + Sync {
    async fn construct(
        &self,
        language: &str,
        device: DeviceKind,
    ) -> SynthesisResult<Arc<dyn Synthesizer>>;
}

/// Built-in speaker table for a language, if the engine ships one.
pub fn builtin_speakers(language: &str) -> Option<SpeakerTable> {
    let speakers: &[(&str, u32)] = match language {
        "EN" => &[
            ("EN-US", 0),
            ("EN-BR", 1),
            ("EN_INDIA", 2),
            ("EN-AU", 3),
            ("EN-Default", 4),
        ],
        "ES" => &[("ES", 0)],
        "FR" => &[("FR", 0)],
        "ZH" => &[("ZH", 1)],
        "JP" => &[("JP", 0)],
        "KR" => &[("KR", 0)],
        _ => return None,
    };

    Some(
        speakers
            .iter()
            .map(|(name, id)| (name.to_string(), *id))
            .collect(),
    )
}
