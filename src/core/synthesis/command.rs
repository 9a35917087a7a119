//! External command-line TTS backend
//!
//! Each synthesis spawns the configured engine CLI as a child process:
//!
//! ```text
//! <program> [args..] --language EN --speaker EN-Default --speed 1.0 --device xpu -- <text> <output.wav>
//! ```
//!
//! The child runs outside the request loop and is killed if the request
//! future is dropped.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{
    SpeakerTable, SynthesisError, SynthesisResult, Synthesizer, SynthesizerFactory,
    builtin_speakers,
};
use crate::core::device::DeviceKind;

/// Program plus leading arguments, e.g. `python -m melo.main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    /// Split a command line on whitespace. Returns `None` for a blank string.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl std::fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Factory constructing [`CommandSynthesizer`] instances.
pub struct CommandSynthesizerFactory {
    engine: EngineCommand,
    warmup_text: Option<String>,
}

impl CommandSynthesizerFactory {
    pub fn new(engine: EngineCommand) -> Self {
        Self {
            engine,
            warmup_text: None,
        }
    }

    /// Render `text` once on the target device during construction.
    ///
    /// Makes device-specific failures surface at construction time, where the
    /// instance cache can still fall back to the CPU.
    pub fn with_warmup_text(mut self, text: Option<String>) -> Self {
        self.warmup_text = text.filter(|t| !t.trim().is_empty());
        self
    }

    async fn check_engine(&self) -> SynthesisResult<()> {
        let status = self
            .engine
            .command()
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| {
                SynthesisError::Construction(format!("cannot run '{}': {e}", self.engine))
            })?;

        if !status.success() {
            return Err(SynthesisError::Construction(format!(
                "'{}' is not usable ({status})",
                self.engine
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SynthesizerFactory for CommandSynthesizerFactory {
    async fn construct(
        &self,
        language: &str,
        device: DeviceKind,
    ) -> SynthesisResult<Arc<dyn Synthesizer>> {
        let speakers = builtin_speakers(language)
            .ok_or_else(|| SynthesisError::UnsupportedLanguage(language.to_string()))?;

        self.check_engine().await?;

        let instance = CommandSynthesizer {
            engine: self.engine.clone(),
            language: language.to_string(),
            device,
            speakers,
        };

        if let Some(text) = &self.warmup_text {
            instance.warm_up(text).await.map_err(|e| {
                SynthesisError::Construction(format!("warm-up on {device} failed: {e}"))
            })?;
            info!(language, %device, "Engine warm-up completed");
        }

        Ok(Arc::new(instance))
    }
}

/// One language on one device, rendered by the external engine.
pub struct CommandSynthesizer {
    engine: EngineCommand,
    language: String,
    device: DeviceKind,
    speakers: SpeakerTable,
}

impl CommandSynthesizer {
    fn speaker_name(&self, speaker: u32) -> Option<&str> {
        self.speakers
            .iter()
            .find(|(_, id)| **id == speaker)
            .map(|(name, _)| name.as_str())
    }

    async fn warm_up(&self, text: &str) -> SynthesisResult<()> {
        let speaker = self
            .speakers
            .values()
            .next()
            .copied()
            .ok_or_else(|| SynthesisError::Synthesis("no speakers".to_string()))?;
        let output = tempfile::Builder::new()
            .prefix("warmup-")
            .suffix(".wav")
            .tempfile()?;
        self.synthesize(text, speaker, output.path(), 1.0).await
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
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
        speaker: u32,
        output_path: &Path,
        speed: f32,
    ) -> SynthesisResult<()> {
        let speaker_name = self
            .speaker_name(speaker)
            .ok_or_else(|| SynthesisError::Synthesis(format!("unknown speaker id {speaker}")))?;

        debug!(
            language = %self.language,
            speaker = speaker_name,
            speed,
            device = %self.device,
            "Running TTS engine"
        );

        let output = self
            .engine
            .command()
            .args(["--language", &self.language])
            .args(["--speaker", speaker_name])
            .args(["--speed", &speed.to_string()])
            .args(["--device", self.device.token()])
            .arg("--")
            .arg(text)
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no diagnostic output")
                .trim()
                .to_string();
            error!(
                status = %output.status,
                reason = %reason,
                "TTS engine command failed"
            );
            return Err(SynthesisError::Synthesis(format!(
                "engine exited with {}: {reason}",
                output.status
            )));
        }

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Fake engine: answers `--help`, optionally refuses `--device xpu`,
    /// otherwise writes a tiny WAV header to the last argument.
    fn fake_engine(dir: &TempDir, fail_xpu: bool) -> EngineCommand {
        let script = dir.path().join("engine.sh");
        let xpu_guard = if fail_xpu {
            r#"case "$*" in *"--device xpu"*) echo "xpu device lost" >&2; exit 1;; esac"#
        } else {
            ""
        };
        let body = format!(
            r#"if [ "$1" = "--help" ]; then exit 0; fi
{xpu_guard}
for arg; do out="$arg"; done
printf 'RIFF0000WAVE' > "$out"
"#
        );
        fs::write(&script, body).unwrap();
        EngineCommand {
            program: "sh".to_string(),
            args: vec![script.display().to_string()],
        }
    }

    #[test]
    fn test_engine_command_parse() {
        let command = EngineCommand::parse("python -m melo.main").unwrap();
        assert_eq!(command.program, "python");
        assert_eq!(command.args, vec!["-m", "melo.main"]);
        assert_eq!(command.to_string(), "python -m melo.main");
        assert!(EngineCommand::parse("   ").is_none());
    }

    #[tokio::test]
    async fn test_construct_unsupported_language() {
        let dir = TempDir::new().unwrap();
        let factory = CommandSynthesizerFactory::new(fake_engine(&dir, false));
        let result = factory.construct("DE", DeviceKind::GeneralPurpose).await;
        assert!(matches!(result, Err(SynthesisError::UnsupportedLanguage(l)) if l == "DE"));
    }

    #[tokio::test]
    async fn test_construct_missing_program() {
        let factory = CommandSynthesizerFactory::new(EngineCommand {
            program: "/nonexistent/tts-engine".to_string(),
            args: Vec::new(),
        });
        let result = factory.construct("EN", DeviceKind::GeneralPurpose).await;
        assert!(matches!(result, Err(SynthesisError::Construction(_))));
    }

    #[tokio::test]
    async fn test_synthesize_writes_output() {
        let dir = TempDir::new().unwrap();
        let factory = CommandSynthesizerFactory::new(fake_engine(&dir, false));
        let instance = factory
            .construct("EN", DeviceKind::GeneralPurpose)
            .await
            .unwrap();
        assert_eq!(instance.language(), "EN");
        assert_eq!(instance.device(), DeviceKind::GeneralPurpose);

        let out = dir.path().join("out.wav");
        let speaker = instance.speaker_table()["EN-Default"];
        instance
            .synthesize("Hello world", speaker, &out, 1.0)
            .await
            .unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"RIFF0000WAVE");
    }

    #[tokio::test]
    async fn test_synthesize_reports_engine_stderr() {
        let dir = TempDir::new().unwrap();
        let engine = fake_engine(&dir, true);
        let instance = CommandSynthesizer {
            engine,
            language: "EN".to_string(),
            device: DeviceKind::Accelerator,
            speakers: builtin_speakers("EN").unwrap(),
        };
        let out = dir.path().join("out.wav");
        match instance.synthesize("Hello", 4, &out, 1.0).await {
            Err(SynthesisError::Synthesis(msg)) => assert!(msg.contains("xpu device lost")),
            other => panic!("Expected Synthesis error, got: {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_synthesize_unknown_speaker_id() {
        let dir = TempDir::new().unwrap();
        let factory = CommandSynthesizerFactory::new(fake_engine(&dir, false));
        let instance = factory.construct("FR", DeviceKind::GeneralPurpose).await.unwrap();
        let out = dir.path().join("out.wav");
        let result = instance.synthesize("Bonjour", 99, &out, 1.0).await;
        assert!(matches!(result, Err(SynthesisError::Synthesis(_))));
    }

    #[tokio::test]
    async fn test_warmup_failure_fails_accelerator_construction() {
        let dir = TempDir::new().unwrap();
        let factory = CommandSynthesizerFactory::new(fake_engine(&dir, true))
            .with_warmup_text(Some("warm up".to_string()));

        let accelerator = factory.construct("EN", DeviceKind::Accelerator).await;
        match accelerator {
            Err(SynthesisError::Construction(msg)) => assert!(msg.contains("warm-up on xpu")),
            other => panic!("Expected Construction error, got: {:?}", other.err()),
        }

        let cpu = factory.construct("EN", DeviceKind::GeneralPurpose).await;
        assert!(cpu.is_ok());
    }

    #[test]
    fn test_blank_warmup_text_is_ignored() {
        let factory = CommandSynthesizerFactory::new(EngineCommand::parse("melo").unwrap())
            .with_warmup_text(Some("  ".to_string()));
        assert!(factory.warmup_text.is_none());
    }
}
