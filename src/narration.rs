//! Speech synthesis for scene narration.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::NarrationConfig;
use crate::error::{EngineError, Result};
use crate::media::MediaToolchain;

const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(120);

/// A synthesized narration clip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narration {
    pub path: PathBuf,
    /// Measured length in seconds
    pub duration: f64,
}

/// Text-to-speech collaborator
#[async_trait]
pub trait NarrationSynthesizer: Send + Sync {
    /// Id used for quota and rate limiting
    fn provider_id(&self) -> &str;

    /// Units billed for `text`. Characters by default.
    fn billable_units(&self, text: &str) -> u64 {
        text.chars().count() as u64
    }

    async fn synthesize(&self, text: &str, voice: &str, style: Option<&str>, output: &Path) -> Result<Narration>;
}

/// Runs an `edge-tts` compatible command and measures the result
pub struct CommandSynthesizer {
    provider_id: String,
    command: String,
    rate: String,
    pitch: String,
    tool: Arc<dyn MediaToolchain>,
}

impl CommandSynthesizer {
    pub fn new(config: &NarrationConfig, tool: Arc<dyn MediaToolchain>) -> Self {
        Self {
            provider_id: config.provider_id.clone(),
            command: config.command.clone(),
            rate: config.rate.clone(),
            pitch: config.pitch.clone(),
            tool,
        }
    }

    /// Command-line arguments for one synthesis
    pub fn build_args(&self, text: &str, voice: &str, output: &Path) -> Vec<String> {
        vec![
            "--voice".to_string(),
            voice.to_string(),
            format!("--rate={}", self.rate),
            format!("--pitch={}", self.pitch),
            "--text".to_string(),
            text.to_string(),
            "--write-media".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl NarrationSynthesizer for CommandSynthesizer {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn synthesize(&self, text: &str, voice: &str, style: Option<&str>, output: &Path) -> Result<Narration> {
        if let Some(style) = style {
            debug!("{} has no style control, ignoring '{}'", self.command, style);
        }

        let run = Command::new(&self.command)
            .args(self.build_args(text, voice, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        let result = tokio::time::timeout(SYNTHESIS_TIMEOUT, run)
            .await
            .map_err(|_| EngineError::Timeout {
                what: format!("{} synthesis", self.command),
                secs: SYNTHESIS_TIMEOUT.as_secs_f64(),
            })?
            .map_err(|e| EngineError::provider(&self.provider_id, format!("failed to run {}: {e}", self.command)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(EngineError::provider(
                &self.provider_id,
                format!("{} exited with {}: {}", self.command, result.status, stderr.trim()),
            ));
        }

        let info = self.tool.probe(output).await?;
        if info.duration <= 0.0 {
            return Err(EngineError::provider(&self.provider_id, "synthesized audio is empty"));
        }
        info!("Narration {} ({:.1}s)", output.display(), info.duration);

        Ok(Narration {
            path: output.to_path_buf(),
            duration: info.duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{FfmpegJob, MediaInfo};

    struct Unused;

    #[async_trait]
    impl MediaToolchain for Unused {
        async fn probe(&self, _: &Path) -> Result<MediaInfo> {
            Err(EngineError::Probe("unused".into()))
        }
        async fn execute(&self, _: &FfmpegJob) -> Result<()> {
            Err(EngineError::Toolchain("unused".into()))
        }
        async fn check_available(&self) -> bool {
            false
        }
    }

    fn synth(command: &str) -> CommandSynthesizer {
        let config = NarrationConfig {
            command: command.to_string(),
            rate: "+10%".to_string(),
            ..Default::default()
        };
        CommandSynthesizer::new(&config, Arc::new(Unused))
    }

    #[test]
    fn billable_units_count_characters() {
        let s = synth("edge-tts");
        assert_eq!(s.billable_units("hello"), 5);
        assert_eq!(s.billable_units("迷子の犬"), 4);
    }

    #[test]
    fn args_follow_edge_tts_conventions() {
        let args = synth("edge-tts").build_args("こんにちは", "ja-JP-NanamiNeural", Path::new("/w/n0.mp3"));
        assert_eq!(args[0..2], ["--voice", "ja-JP-NanamiNeural"]);
        assert!(args.contains(&"--rate=+10%".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/w/n0.mp3"));
    }

    #[tokio::test]
    async fn missing_command_is_provider_error() {
        let err = synth("scenecast-no-such-tts-binary")
            .synthesize("hi", "v", None, Path::new("/tmp/never.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Provider { .. }));
        assert!(err.is_transient());
    }
}
