//! Media toolchain abstraction
//!
//! Every ffmpeg invocation in the engine is expressed as an [`FfmpegJob`]
//! and executed through a [`MediaToolchain`]. Stages never spawn processes
//! themselves, so the whole pipeline can be driven against a fake toolchain
//! in tests.

pub mod ffmpeg;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{EngineError, Result};

pub use ffmpeg::FfmpegToolchain;

/// Allowed drift between a job's promised duration and the probed result (seconds)
pub const DURATION_TOLERANCE: f64 = 0.2;

/// Pixel format every encode is written in
pub const PIXEL_FORMAT: &str = "yuv420p";

/// Canonical output format every scene clip is brought to before assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
    pub channels: u32,
    /// Video codec passed to `-c:v`
    pub codec: String,
    /// x264 preset
    pub preset: String,
    pub crf: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            sample_rate: 48_000,
            channels: 2,
            codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 20,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

impl VideoFormat {
    /// `WxH` string for zoompan / color sources
    #[must_use]
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Video encoder arguments
    #[must_use]
    pub fn video_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            PIXEL_FORMAT.to_string(),
            "-r".to_string(),
            self.fps.to_string(),
        ]
    }

    /// Audio encoder arguments
    #[must_use]
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
        ]
    }

    /// ffmpeg channel layout name
    pub fn channel_layout(&self) -> &'static str {
        if self.channels == 1 {
            "mono"
        } else {
            "stereo"
        }
    }

    /// Arguments adding a silent lavfi audio input in this format
    #[must_use]
    pub fn silence_input(&self) -> Vec<String> {
        vec![
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!("anullsrc=r={}:cl={}", self.sample_rate, self.channel_layout()),
        ]
    }

    /// Whether a probed clip can be stream-copied next to clips encoded in
    /// this format: same geometry, frame rate, codecs, pixel format and audio layout
    pub fn matches(&self, info: &MediaInfo) -> bool {
        let video_ok = info.width == Some(self.width)
            && info.height == Some(self.height)
            && info
                .fps
                .is_some_and(|fps| (fps - f64::from(self.fps)).abs() < 0.01)
            && info.video_codec.as_deref() == Some(stream_codec(&self.codec))
            && info.pix_fmt.as_deref() == Some(PIXEL_FORMAT);
        let audio_ok = info.sample_rate == Some(self.sample_rate)
            && info.channels == Some(self.channels)
            && info.audio_codec.as_deref() == Some(stream_codec(&self.audio_codec));
        video_ok && audio_ok
    }
}

/// Codec name ffprobe reports for streams written by `encoder`
pub fn stream_codec(encoder: &str) -> &str {
    match encoder {
        "libx264" | "h264_nvenc" | "h264_videotoolbox" => "h264",
        "libx265" | "hevc_nvenc" | "hevc_videotoolbox" => "hevc",
        "libvpx-vp9" => "vp9",
        "libaom-av1" | "libsvtav1" => "av1",
        "libopus" => "opus",
        "libmp3lame" => "mp3",
        "libfdk_aac" => "aac",
        other => other,
    }
}

/// Stream facts reported by the probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds
    pub duration: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    /// ffprobe `codec_name` of the first video stream
    #[serde(default)]
    pub video_codec: Option<String>,
    #[serde(default)]
    pub pix_fmt: Option<String>,
    #[serde(default)]
    pub audio_codec: Option<String>,
}

impl MediaInfo {
    /// Audio-only media of the given length
    #[must_use]
    pub fn audio(duration: f64, sample_rate: u32, channels: u32) -> Self {
        Self {
            duration,
            sample_rate: Some(sample_rate),
            channels: Some(channels),
            ..Default::default()
        }
    }

    /// Video media in the given format, with audio when `with_audio` is set
    #[must_use]
    pub fn video(duration: f64, format: &VideoFormat, with_audio: bool) -> Self {
        Self {
            duration,
            width: Some(format.width),
            height: Some(format.height),
            fps: Some(f64::from(format.fps)),
            sample_rate: with_audio.then_some(format.sample_rate),
            channels: with_audio.then_some(format.channels),
            video_codec: Some(stream_codec(&format.codec).to_string()),
            pix_fmt: Some(PIXEL_FORMAT.to_string()),
            audio_codec: with_audio.then(|| stream_codec(&format.audio_codec).to_string()),
        }
    }

    pub fn has_video(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.sample_rate.is_some()
    }
}

/// One ffmpeg invocation. The output path is appended after `args`.
#[derive(Debug, Clone)]
pub struct FfmpegJob {
    /// Human readable label for logs and errors
    pub label: String,
    pub args: Vec<String>,
    pub output: PathBuf,
    /// Duration the produced file must have, if the caller relies on it
    pub expected_duration: Option<f64>,
}

impl FfmpegJob {
    pub fn new(label: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            args: Vec::new(),
            output: output.into(),
            expected_duration: None,
        }
    }

    /// Append a single argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `-i <path>`
    #[must_use]
    pub fn input(self, path: &Path) -> Self {
        self.arg("-i").arg(path.to_string_lossy())
    }

    #[must_use]
    pub fn expect_duration(mut self, secs: f64) -> Self {
        self.expected_duration = Some(secs);
        self
    }

    /// Inputs referenced by `-i`, in order
    pub fn inputs(&self) -> Vec<&str> {
        self.args
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].as_str())
            .collect()
    }

    /// Value following `flag`, e.g. the filter graph after `-filter_complex`
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .windows(2)
            .find(|w| w[0] == flag)
            .map(|w| w[1].as_str())
    }
}

/// Process-level access to ffmpeg/ffprobe
#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Measure a media file
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Run one job to completion
    async fn execute(&self, job: &FfmpegJob) -> Result<()>;

    /// Whether the underlying binaries are usable
    async fn check_available(&self) -> bool;
}

/// Execute a job, probe its output and enforce the promised duration.
pub async fn render(tool: &dyn MediaToolchain, job: &FfmpegJob) -> Result<MediaInfo> {
    debug!("{}: ffmpeg {}", job.label, job.args.join(" "));
    tool.execute(job).await?;
    let info = tool.probe(&job.output).await?;
    if let Some(expected) = job.expected_duration {
        if (info.duration - expected).abs() > DURATION_TOLERANCE {
            return Err(EngineError::Toolchain(format!(
                "{}: produced {:.2}s, expected {:.2}s",
                job.label, info.duration, expected
            )));
        }
    }
    Ok(info)
}

/// Escape a filesystem path used inside a filter argument
#[must_use]
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Seconds with millisecond precision, as ffmpeg expects them
#[must_use]
pub fn secs(value: f64) -> String {
    format!("{value:.3}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_probed_clip() {
        let format = VideoFormat::default();
        let info = MediaInfo::video(4.0, &format, true);
        assert!(format.matches(&info));

        let silent = MediaInfo::video(4.0, &format, false);
        assert!(!format.matches(&silent));

        let hevc = MediaInfo {
            video_codec: Some("hevc".into()),
            ..info.clone()
        };
        assert!(!format.matches(&hevc));

        let yuv444 = MediaInfo {
            pix_fmt: Some("yuv444p".into()),
            ..info.clone()
        };
        assert!(!format.matches(&yuv444));

        let opus = MediaInfo {
            audio_codec: Some("opus".into()),
            ..info.clone()
        };
        assert!(!format.matches(&opus));

        let small = MediaInfo {
            width: Some(1280),
            height: Some(720),
            ..info
        };
        assert!(!format.matches(&small));
    }

    #[test]
    fn encoder_names_map_to_probed_codecs() {
        assert_eq!(stream_codec("libx264"), "h264");
        assert_eq!(stream_codec("aac"), "aac");
        assert_eq!(stream_codec("libopus"), "opus");
    }

    #[test]
    fn job_builder_collects_inputs_and_flags() {
        let job = FfmpegJob::new("test", "/tmp/out.mp4")
            .input(Path::new("/tmp/a.mp4"))
            .input(Path::new("/tmp/b.wav"))
            .args(["-filter_complex", "[0:v]null[v]"])
            .expect_duration(3.5);

        assert_eq!(job.inputs(), vec!["/tmp/a.mp4", "/tmp/b.wav"]);
        assert_eq!(job.value_of("-filter_complex"), Some("[0:v]null[v]"));
        assert_eq!(job.expected_duration, Some(3.5));
    }

    #[test]
    fn secs_formats_milliseconds() {
        assert_eq!(secs(4.0), "4.000");
        assert_eq!(secs(1.23456), "1.235");
    }
}
