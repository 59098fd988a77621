//! ffmpeg / ffprobe subprocess toolchain

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::warn;

use super::{FfmpegJob, MediaInfo, MediaToolchain};
use crate::error::{EngineError, Result};

/// Runs jobs through the system ffmpeg and measures files with ffprobe
#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for FfmpegToolchain {
    fn default() -> Self {
        Self {
            ffmpeg_path: locate("ffmpeg"),
            ffprobe_path: locate("ffprobe"),
        }
    }
}

fn locate(binary: &str) -> String {
    which::which(binary).map_or_else(|_| binary.to_string(), |p| p.to_string_lossy().to_string())
}

impl FfmpegToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit binary paths
    #[must_use]
    pub fn with_paths(ffmpeg: &str, ffprobe: &str) -> Self {
        Self {
            ffmpeg_path: ffmpeg.to_string(),
            ffprobe_path: ffprobe.to_string(),
        }
    }

    /// Full argument vector for a job
    pub fn build_args(job: &FfmpegJob) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "-y".to_string(),
        ];
        args.extend(job.args.iter().cloned());
        args.push(job.output.to_string_lossy().to_string());
        args
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    pix_fmt: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Parse a rational rate such as "30/1" or "30000/1001"
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den > 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}

fn parse_probe(raw: &[u8]) -> Result<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(raw)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    // Container duration first, then the longest stream
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
                .reduce(f64::max)
        })
        .ok_or_else(|| EngineError::Probe("no duration reported".to_string()))?;

    Ok(MediaInfo {
        duration,
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        fps: video
            .and_then(|v| v.r_frame_rate.as_deref())
            .and_then(parse_rate),
        sample_rate: audio
            .and_then(|a| a.sample_rate.as_deref())
            .and_then(|r| r.parse().ok()),
        channels: audio.and_then(|a| a.channels),
        video_codec: video.and_then(|v| v.codec_name.clone()),
        pix_fmt: video.and_then(|v| v.pix_fmt.clone()),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
    })
}

#[async_trait]
impl MediaToolchain for FfmpegToolchain {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        if !path.exists() {
            return Err(EngineError::MissingAsset(path.display().to_string()));
        }

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(EngineError::Probe(format!("ffprobe failed on {}", path.display())));
        }

        parse_probe(&output.stdout)
    }

    async fn execute(&self, job: &FfmpegJob) -> Result<()> {
        let args = Self::build_args(job);
        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            warn!("{} failed: {}", job.label, output.status);
            return Err(EngineError::Toolchain(format!(
                "{} exited with {}: {}",
                job.label,
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }

        if !job.output.exists() {
            return Err(EngineError::Toolchain(format!(
                "{} produced no output at {}",
                job.label,
                job.output.display()
            )));
        }

        Ok(())
    }

    async fn check_available(&self) -> bool {
        for binary in [&self.ffmpeg_path, &self.ffprobe_path] {
            let ok = Command::new(binary)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false);
            if !ok {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_appends_output_last() {
        let job = FfmpegJob::new("probe", "/tmp/out.mp4")
            .input(Path::new("/tmp/in.mp4"))
            .args(["-t", "4.000"]);
        let args = FfmpegToolchain::build_args(&job);
        assert_eq!(&args[..4], &["-hide_banner", "-loglevel", "warning", "-y"]);
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
        assert!(args.contains(&"/tmp/in.mp4".to_string()));
    }

    #[test]
    fn parse_rate_handles_ntsc() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        let ntsc = parse_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("25"), Some(25.0));
    }

    #[test]
    fn parse_probe_video_with_audio() {
        let raw = br#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "pix_fmt": "yuv420p",
                 "width": 1920, "height": 1080, "r_frame_rate": "30/1"},
                {"codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2}
            ],
            "format": {"duration": "6.016000"}
        }"#;
        let info = parse_probe(raw).unwrap();
        assert!((info.duration - 6.016).abs() < 1e-9);
        assert_eq!(info.width, Some(1920));
        assert_eq!(info.fps, Some(30.0));
        assert_eq!(info.sample_rate, Some(48_000));
        assert_eq!(info.channels, Some(2));
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.pix_fmt.as_deref(), Some("yuv420p"));
        assert_eq!(info.audio_codec.as_deref(), Some("aac"));
        assert!(crate::media::VideoFormat::default().matches(&info));
    }

    #[test]
    fn parse_probe_falls_back_to_stream_duration() {
        let raw = br#"{
            "streams": [{"codec_type": "audio", "sample_rate": "24000", "channels": 1, "duration": "3.5"}],
            "format": {}
        }"#;
        let info = parse_probe(raw).unwrap();
        assert!((info.duration - 3.5).abs() < 1e-9);
        assert!(!info.has_video());
        assert!(info.has_audio());
    }

    #[test]
    fn parse_probe_without_duration_is_error() {
        let raw = br#"{"streams": [], "format": {}}"#;
        assert!(matches!(parse_probe(raw), Err(EngineError::Probe(_))));
    }
}
