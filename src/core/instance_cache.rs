//! Per-(language, device) inference instance cache
//!
//! Instances are expensive to construct (weights are loaded onto the device),
//! so each one is built once and shared by every later request. Entries are
//! keyed by the device the instance actually runs on and are never evicted.
//!
//! Construction goes through [`moka::future::Cache::try_get_with`], so
//! concurrent first requests for the same key wait on a single construction
//! instead of racing. Failed constructions are not cached.
//!
//! When the process selected the accelerator but constructing an instance on
//! it fails, the cache falls back to a CPU instance for that language. Once
//! that CPU instance exists the language is pinned to it and the accelerator
//! is not tried again. A language nobody can build (unknown language, or both
//! devices failing) leaves no trace and is retried from scratch.
//!
//! Construction can share the synthesis semaphore so that warm-up renders
//! count against the same concurrency limit as requests.

use std::sync::Arc;

use dashmap::DashSet;
use moka::future::Cache;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::device::{DeviceKind, DeviceSelection};
use super::synthesis::{SynthesisError, Synthesizer, SynthesizerFactory};

/// Cache key: one instance per language per device actually used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub language: String,
    pub device: DeviceKind,
}

impl InstanceKey {
    pub fn new(language: impl Into<String>, device: DeviceKind) -> Self {
        Self {
            language: language.into(),
            device,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// No instance could be built on any device.
    #[error("{0}")]
    Construction(String),
}

/// Lazily populated map of inference instances.
pub struct InstanceCache {
    factory: Arc<dyn SynthesizerFactory>,
    instances: Cache<InstanceKey, Arc<dyn Synthesizer>>,
    /// Languages served from a CPU fallback instance.
    accelerator_failed: DashSet<String>,
    permits: Option<Arc<Semaphore>>,
}

impl InstanceCache {
    pub fn new(factory: Arc<dyn SynthesizerFactory>) -> Self {
        Self {
            factory,
            instances: Cache::builder().build(),
            accelerator_failed: DashSet::new(),
            permits: None,
        }
    }

    /// Hold a permit from `permits` while an instance is being constructed.
    pub fn with_permits(mut self, permits: Arc<Semaphore>) -> Self {
        self.permits = Some(permits);
        self
    }

    /// Return the instance for `language`, constructing it on first use.
    ///
    /// Prefers the device in `selection`; an accelerator construction failure
    /// falls back to the CPU. Only a failure on the CPU as well is an error.
    pub async fn get_instance(
        &self,
        language: &str,
        selection: &DeviceSelection,
    ) -> Result<Arc<dyn Synthesizer>, CacheError> {
        if selection.kind == DeviceKind::GeneralPurpose {
            return self
                .get_or_construct(language, DeviceKind::GeneralPurpose)
                .await
                .map_err(|e| CacheError::Construction(e.to_string()));
        }

        if self.accelerator_failed.contains(language) {
            return self
                .get_or_construct(language, DeviceKind::GeneralPurpose)
                .await
                .map_err(|e| CacheError::Construction(e.to_string()));
        }

        let accelerator_error = match self.get_or_construct(language, DeviceKind::Accelerator).await {
            Ok(instance) => return Ok(instance),
            Err(e) => e,
        };

        // Not a device problem, the CPU would refuse it too
        if matches!(*accelerator_error, SynthesisError::UnsupportedLanguage(_)) {
            return Err(CacheError::Construction(accelerator_error.to_string()));
        }

        warn!(
            language,
            error = %accelerator_error,
            "Failed to create TTS model on accelerator, falling back to CPU"
        );

        match self.get_or_construct(language, DeviceKind::GeneralPurpose).await {
            Ok(instance) => {
                self.accelerator_failed.insert(language.to_string());
                Ok(instance)
            }
            Err(cpu_error) => Err(CacheError::Construction(format!(
                "accelerator: {accelerator_error}; cpu fallback: {cpu_error}"
            ))),
        }
    }

    /// Number of live instances.
    pub async fn cached_count(&self) -> u64 {
        // Pending inserts are only counted once housekeeping has run
        self.instances.run_pending_tasks().await;
        self.instances.entry_count()
    }

    /// Whether `language` is pinned to the CPU after an accelerator failure.
    pub fn accelerator_failed(&self, language: &str) -> bool {
        self.accelerator_failed.contains(language)
    }

    async fn get_or_construct(
        &self,
        language: &str,
        device: DeviceKind,
    ) -> Result<Arc<dyn Synthesizer>, Arc<SynthesisError>> {
        let key = InstanceKey::new(language, device);
        let factory = Arc::clone(&self.factory);
        let permits = self.permits.clone();

        self.instances
            .try_get_with(key, async move {
                let _permit = match permits {
                    Some(permits) => Some(
                        permits
                            .acquire_owned()
                            .await
                            .map_err(|e| SynthesisError::Construction(e.to_string()))?,
                    ),
                    None => None,
                };
                info!(language, %device, "Creating TTS model");
                let instance = factory.construct(language, device).await?;
                info!(language, device = %instance.device(), "TTS model ready");
                Ok::<_, SynthesisError>(instance)
            })
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::synthesis::{SpeakerTable, SynthesisResult, builtin_speakers};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Instance that writes a fixed WAV-looking payload.
    pub struct FakeSynthesizer {
        pub language: String,
        pub device: DeviceKind,
        pub speakers: SpeakerTable,
    }

    #[async_trait]
    impl Synthesizer for FakeSynthesizer {
        fn language(&self) -> &str {
            &self.language
        }

        fn device(&self) -> DeviceKind {
            self.device
        }

        fn speaker_table(&self) -> &SpeakerTable {
            &self.speakers
        }

        async fn synthesize(
            &self,
            text: &str,
            _speaker: u32,
            output_path: &Path,
            _speed: f32,
        ) -> SynthesisResult<()> {
            if text.contains("explode") {
                return Err(SynthesisError::Synthesis("engine crashed".to_string()));
            }
            tokio::fs::write(output_path, b"RIFF\x24\x00\x00\x00WAVEfmt ").await?;
            Ok(())
        }
    }

    /// Factory that counts constructions and can refuse a device.
    pub struct FakeFactory {
        pub constructions: AtomicUsize,
        pub fail_accelerator: bool,
        pub fail_cpu: bool,
        pub delay: Duration,
    }

    impl FakeFactory {
        pub fn new() -> Self {
            Self {
                constructions: AtomicUsize::new(0),
                fail_accelerator: false,
                fail_cpu: false,
                delay: Duration::ZERO,
            }
        }

        pub fn constructions(&self) -> usize {
            self.constructions.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SynthesizerFactory for FakeFactory {
        async fn construct(
            &self,
            language: &str,
            device: DeviceKind,
        ) -> SynthesisResult<Arc<dyn Synthesizer>> {
            self.constructions.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let speakers = builtin_speakers(language)
                .ok_or_else(|| SynthesisError::UnsupportedLanguage(language.to_string()))?;
            match device {
                DeviceKind::Accelerator if self.fail_accelerator => Err(
                    SynthesisError::Construction("XPU out of memory".to_string()),
                ),
                DeviceKind::GeneralPurpose if self.fail_cpu => Err(
                    SynthesisError::Construction("weights missing".to_string()),
                ),
                _ => Ok(Arc::new(FakeSynthesizer {
                    language: language.to_string(),
                    device,
                    speakers,
                })),
            }
        }
    }

    fn accelerator() -> DeviceSelection {
        DeviceSelection::accelerator("Intel(R) Arc(TM) A770 Graphics")
    }

    #[tokio::test]
    async fn test_instance_constructed_once_per_key() {
        let factory = Arc::new(FakeFactory::new());
        let cache = InstanceCache::new(factory.clone());
        let selection = DeviceSelection::general_purpose();

        let first = cache.get_instance("EN", &selection).await.unwrap();
        let second = cache.get_instance("EN", &selection).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.constructions(), 1);
        assert_eq!(cache.cached_count().await, 1);
    }

    #[tokio::test]
    async fn test_instances_per_language() {
        let factory = Arc::new(FakeFactory::new());
        let cache = InstanceCache::new(factory.clone());
        let selection = accelerator();

        let en = cache.get_instance("EN", &selection).await.unwrap();
        let fr = cache.get_instance("FR", &selection).await.unwrap();

        assert_eq!(en.language(), "EN");
        assert_eq!(fr.language(), "FR");
        assert_eq!(en.device(), DeviceKind::Accelerator);
        assert_eq!(factory.constructions(), 2);
        assert_eq!(cache.cached_count().await, 2);
    }

    #[tokio::test]
    async fn test_accelerator_failure_falls_back_to_cpu() {
        let factory = Arc::new(FakeFactory {
            fail_accelerator: true,
            ..FakeFactory::new()
        });
        let cache = InstanceCache::new(factory.clone());

        let instance = cache.get_instance("EN", &accelerator()).await.unwrap();
        assert_eq!(instance.device(), DeviceKind::GeneralPurpose);
        assert!(cache.accelerator_failed("EN"));
        // One accelerator attempt, one CPU construction
        assert_eq!(factory.constructions(), 2);
    }

    #[tokio::test]
    async fn test_fallback_language_does_not_retry_accelerator() {
        let factory = Arc::new(FakeFactory {
            fail_accelerator: true,
            ..FakeFactory::new()
        });
        let cache = InstanceCache::new(factory.clone());
        let selection = accelerator();

        let first = cache.get_instance("EN", &selection).await.unwrap();
        let second = cache.get_instance("EN", &selection).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.constructions(), 2);
        assert_eq!(cache.cached_count().await, 1);
    }

    #[tokio::test]
    async fn test_double_failure_reports_both_causes() {
        let factory = Arc::new(FakeFactory {
            fail_accelerator: true,
            fail_cpu: true,
            ..FakeFactory::new()
        });
        let cache = InstanceCache::new(factory);

        match cache.get_instance("EN", &accelerator()).await {
            Err(CacheError::Construction(msg)) => {
                assert!(msg.contains("XPU out of memory"), "{msg}");
                assert!(msg.contains("weights missing"), "{msg}");
            }
            Ok(_) => panic!("Expected construction failure"),
        }
        assert_eq!(cache.cached_count().await, 0);
        assert!(!cache.accelerator_failed("EN"));
    }

    /// Factory whose devices each fail a fixed number of times, then recover.
    struct FlakyFactory {
        accelerator_failures: AtomicUsize,
        cpu_failures: AtomicUsize,
        accelerator_calls: AtomicUsize,
    }

    impl FlakyFactory {
        fn failing_once() -> Self {
            Self {
                accelerator_failures: AtomicUsize::new(1),
                cpu_failures: AtomicUsize::new(1),
                accelerator_calls: AtomicUsize::new(0),
            }
        }
    }

    fn take_failure(budget: &AtomicUsize) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl SynthesizerFactory for FlakyFactory {
        async fn construct(
            &self,
            language: &str,
            device: DeviceKind,
        ) -> SynthesisResult<Arc<dyn Synthesizer>> {
            let budget = match device {
                DeviceKind::Accelerator => {
                    self.accelerator_calls.fetch_add(1, Ordering::SeqCst);
                    &self.accelerator_failures
                }
                DeviceKind::GeneralPurpose => &self.cpu_failures,
            };
            if take_failure(budget) {
                return Err(SynthesisError::Construction(format!("{device} busy")));
            }
            Ok(Arc::new(FakeSynthesizer {
                language: language.to_string(),
                device,
                speakers: builtin_speakers(language).unwrap_or_default(),
            }))
        }
    }

    #[tokio::test]
    async fn test_double_failure_retries_accelerator_next_time() {
        let factory = Arc::new(FlakyFactory::failing_once());
        let cache = InstanceCache::new(factory.clone());
        let selection = accelerator();

        assert!(cache.get_instance("EN", &selection).await.is_err());
        assert!(!cache.accelerator_failed("EN"));

        let instance = cache.get_instance("EN", &selection).await.unwrap();
        assert_eq!(instance.device(), DeviceKind::Accelerator);
        assert_eq!(factory.accelerator_calls.load(Ordering::SeqCst), 2);
        assert!(!cache.accelerator_failed("EN"));
    }

    #[tokio::test]
    async fn test_unsupported_language_is_not_a_device_failure() {
        let factory = Arc::new(FakeFactory::new());
        let cache = InstanceCache::new(factory.clone());
        let selection = accelerator();

        for i in 0..100 {
            let language = format!("junk-{i}");
            match cache.get_instance(&language, &selection).await {
                Err(CacheError::Construction(msg)) => {
                    assert!(msg.contains(&language), "{msg}");
                    assert!(!msg.contains("cpu fallback"), "{msg}");
                }
                Ok(_) => panic!("Expected unsupported language"),
            }
            assert!(!cache.accelerator_failed(&language));
        }
        // No CPU attempt follows an unsupported language
        assert_eq!(factory.constructions(), 100);
        assert_eq!(cache.cached_count().await, 0);
    }

    #[tokio::test]
    async fn test_construction_waits_for_synthesis_permit() {
        let permits = Arc::new(Semaphore::new(1));
        let cache = InstanceCache::new(Arc::new(FakeFactory::new())).with_permits(permits.clone());
        let selection = DeviceSelection::general_purpose();

        let held = permits.clone().acquire_owned().await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), cache.get_instance("EN", &selection))
                .await;
        assert!(blocked.is_err(), "construction ran without a permit");

        drop(held);
        assert!(cache.get_instance("EN", &selection).await.is_ok());
        assert_eq!(permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_cpu_selection_failure_surfaces_directly() {
        let factory = Arc::new(FakeFactory {
            fail_cpu: true,
            ..FakeFactory::new()
        });
        let cache = InstanceCache::new(factory.clone());

        let result = cache
            .get_instance("EN", &DeviceSelection::general_purpose())
            .await;
        assert!(matches!(result, Err(CacheError::Construction(msg)) if msg.contains("weights missing")));
        assert!(!cache.accelerator_failed("EN"));
        assert_eq!(factory.constructions(), 1);
    }

    #[tokio::test]
    async fn test_failed_construction_is_retried() {
        let factory = Arc::new(FakeFactory::new());
        let cache = InstanceCache::new(factory.clone());
        let selection = DeviceSelection::general_purpose();

        assert!(cache.get_instance("DE", &selection).await.is_err());
        assert!(cache.get_instance("DE", &selection).await.is_err());
        assert_eq!(factory.constructions(), 2);
        assert_eq!(cache.cached_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_construct_once() {
        let factory = Arc::new(FakeFactory {
            delay: Duration::from_millis(50),
            ..FakeFactory::new()
        });
        let cache = Arc::new(InstanceCache::new(factory.clone()));
        let selection = accelerator();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let selection = selection.clone();
                tokio::spawn(async move { cache.get_instance("ZH", &selection).await })
            })
            .collect();

        let mut instances = Vec::new();
        for handle in handles {
            instances.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(factory.constructions(), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
