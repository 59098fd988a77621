//! Engine configuration loaded from `~/.config/scenecast/config.toml`.
//!
//! Every section is optional; a missing file or missing keys fall back to
//! the defaults below.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::media::VideoFormat;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub paths: PathsConfig,
    pub video: VideoFormat,
    pub narration: NarrationConfig,
    pub premium: PremiumConfig,
    pub fallback: FallbackConfig,
    pub overlay: OverlayConfig,
    pub audio: AudioConfig,
    pub assembly: AssemblyConfig,
    pub retry: RetryConfig,
}

/// Working, output and state directories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Scratch space for intermediate files; one subdirectory per run
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Where per-provider quota records live
    pub quota_dir: PathBuf,
    /// Directory holding `scene_<n>.png` stills
    pub stills_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("scenecast"),
            output_dir: PathBuf::from("."),
            quota_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scenecast")
                .join("quota"),
            stills_dir: None,
        }
    }
}

/// Speech synthesis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Provider id used for quota and rate limiting
    pub provider_id: String,
    /// TTS executable
    pub command: String,
    pub voice: String,
    /// Speaking rate, e.g. "+10%"
    pub rate: String,
    /// Pitch shift, e.g. "+0Hz"
    pub pitch: String,
    /// Optional speaking style passed through to the synthesizer
    pub style: Option<String>,
    /// Billable characters per calendar month
    pub monthly_char_limit: u64,
    pub min_interval_secs: f64,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            provider_id: "tts".to_string(),
            command: "edge-tts".to_string(),
            voice: "ja-JP-NanamiNeural".to_string(),
            rate: "+0%".to_string(),
            pitch: "+0Hz".to_string(),
            style: None,
            monthly_char_limit: 10_000,
            min_interval_secs: 0.5,
        }
    }
}

/// Premium clip generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PremiumConfig {
    pub enabled: bool,
    pub provider_id: String,
    /// Task API base URL
    pub endpoint: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub poll_interval_secs: f64,
    /// Hard wall-clock limit per scene
    pub timeout_secs: f64,
    pub min_interval_secs: f64,
    /// Billable clips per calendar month
    pub monthly_clip_limit: u64,
    /// Length the provider renders per request
    pub clip_seconds: f64,
    /// Camera moves picked from when building motion prompts
    pub motion_prompts: Vec<String>,
    /// Fixed seed for reproducible prompt variation
    pub seed: Option<u64>,
}

impl Default for PremiumConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider_id: "premium-video".to_string(),
            endpoint: String::new(),
            api_key_env: "SCENECAST_VIDEO_API_KEY".to_string(),
            poll_interval_secs: 10.0,
            timeout_secs: 600.0,
            min_interval_secs: 60.0,
            monthly_clip_limit: 100,
            clip_seconds: 8.0,
            motion_prompts: vec![
                "Slow cinematic camera movement".to_string(),
                "Gentle dolly forward".to_string(),
                "Smooth lateral tracking shot".to_string(),
                "Subtle handheld drift".to_string(),
            ],
            seed: None,
        }
    }
}

/// Local pan/zoom fallback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Upper bound on a single animated clip
    pub max_clip_secs: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { max_clip_secs: 60.0 }
    }
}

/// Overlay graphics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub enabled: bool,
    pub channel_name: String,
    /// TrueType font for drawtext; ffmpeg's default font when unset
    pub font_file: Option<PathBuf>,
    /// Show the headline banner on every scene instead of only the first
    pub headline_on_all_scenes: bool,
    /// Burn each scene's narration as a caption
    pub captions: bool,
    /// Accent colour (breaking label, channel mark)
    pub accent_color: String,
    /// Banner background colour
    pub banner_color: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_name: "SCENECAST NEWS".to_string(),
            font_file: None,
            headline_on_all_scenes: false,
            captions: true,
            accent_color: "0xe94560".to_string(),
            banner_color: "0x1a1a2e".to_string(),
        }
    }
}

/// Background music settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Directory with `<mood>.mp3` tracks
    pub bgm_dir: PathBuf,
    pub narration_gain: f64,
    pub bgm_gain: f64,
    pub fade_in_secs: f64,
    pub fade_out_secs: f64,
    /// Use the neutral track when the detected mood has none
    pub neutral_fallback: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            bgm_dir: PathBuf::from("assets").join("bgm"),
            narration_gain: 1.0,
            bgm_gain: 0.12,
            fade_in_secs: 1.0,
            fade_out_secs: 2.0,
            neutral_fallback: false,
        }
    }
}

impl AudioConfig {
    /// Music gain ceiling; keeps narration dominant in the mix
    pub const MAX_BGM_GAIN: f64 = 0.5;

    /// Pull gains back into the range where the voice stays on top
    fn clamp_gains(&mut self) {
        let defaults = Self::default();
        let narration = if self.narration_gain.is_finite() {
            self.narration_gain.clamp(0.5, 2.0)
        } else {
            defaults.narration_gain
        };
        let bgm = if self.bgm_gain.is_finite() {
            self.bgm_gain.clamp(0.0, Self::MAX_BGM_GAIN)
        } else {
            defaults.bgm_gain
        };
        if narration.to_bits() != self.narration_gain.to_bits() || bgm.to_bits() != self.bgm_gain.to_bits() {
            warn!(
                "Audio gains clamped: narration {} -> {narration}, bgm {} -> {bgm}",
                self.narration_gain, self.bgm_gain
            );
        }
        self.narration_gain = narration;
        self.bgm_gain = bgm;
    }
}

/// Intro/outro and final output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Pre-rendered intro clip; a title card is generated when unset
    pub intro: Option<PathBuf>,
    pub outro: Option<PathBuf>,
    pub intro_secs: f64,
    pub outro_secs: f64,
    pub outro_text: String,
    /// Write an SRT sidecar next to the final video
    pub captions_sidecar: bool,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            intro: None,
            outro: None,
            intro_secs: 2.0,
            outro_secs: 3.0,
            outro_text: "Thanks for watching".to_string(),
            captions_sidecar: true,
        }
    }
}

/// Retry policy for transient provider failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields the built-in defaults; an explicit path
    /// must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        Self::from_toml(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.audio.clamp_gains();
        Ok(config)
    }
}

/// Return the path to the default config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scenecast")
        .join("config.toml")
}
