pub mod accelerator;
pub mod device;
pub mod instance_cache;
pub mod isolation;
pub mod service;
pub mod synthesis;

// Re-export commonly used types for convenience
pub use device::{AcceleratorRuntime, DeviceKind, DeviceProber, DeviceSelection, ProbeError};
pub use instance_cache::{CacheError, InstanceCache, InstanceKey};
pub use service::{ServiceError, SpeechService, SynthesisParams};
pub use synthesis::{
    CommandSynthesizerFactory, EngineCommand, SUPPORTED_LANGUAGES, SpeakerTable,
    SynthesisError, Synthesizer, SynthesizerFactory,
};
