//! Final assembly: intro, scene clips and outro into one muxed file.
//!
//! Segments already in the canonical [`VideoFormat`] are concatenated as-is
//! with the concat demuxer; anything else is normalized first. The mixed
//! audio is delayed by the intro and trimmed to the video length.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::media::{self, FfmpegJob, MediaInfo, MediaToolchain, VideoFormat};

/// Assembled output
#[derive(Debug, Clone, Serialize)]
pub struct Assembled {
    pub path: PathBuf,
    pub duration: f64,
    /// Segments that had to be re-encoded
    pub normalized: usize,
}

/// A probed input segment
#[derive(Debug, Clone)]
struct Segment {
    path: PathBuf,
    duration: f64,
}

/// Joins clips and muxes the final audio
#[derive(Clone)]
pub struct Assembler {
    tool: Arc<dyn MediaToolchain>,
    format: VideoFormat,
    work_dir: PathBuf,
}

impl Assembler {
    pub fn new(tool: Arc<dyn MediaToolchain>, format: VideoFormat, work_dir: &Path) -> Self {
        Self {
            tool,
            format,
            work_dir: work_dir.to_path_buf(),
        }
    }

    /// Whether a clip has to be re-encoded before concatenation
    pub fn needs_normalization(&self, info: &MediaInfo) -> bool {
        !self.format.matches(info)
    }

    /// Re-encode a clip into the canonical format, adding silence if it has no audio
    pub fn normalize_job(&self, clip: &Path, info: &MediaInfo, output: &Path) -> FfmpegJob {
        let (w, h) = (self.format.width, self.format.height);
        let video_filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={},format=yuv420p",
            self.format.fps
        );

        let mut job = FfmpegJob::new(
            format!("normalize {}", clip.file_name().map_or_else(String::new, |n| n.to_string_lossy().to_string())),
            output,
        )
        .input(clip);

        job = if info.has_audio() {
            job.args([
                "-filter:a".to_string(),
                format!(
                    "aresample={},aformat=channel_layouts={}",
                    self.format.sample_rate,
                    self.format.channel_layout()
                ),
            ])
            .args(["-map", "0:v:0", "-map", "0:a:0"])
        } else {
            job.args(self.format.silence_input()).args(["-map", "0:v:0", "-map", "1:a:0"])
        };

        job.args(["-filter:v".to_string(), video_filter])
            .args(["-t".to_string(), media::secs(info.duration)])
            .args(self.format.video_args())
            .args(self.format.audio_args())
            .expect_duration(info.duration)
    }

    /// Concat demuxer list. Single quotes in paths are closed, escaped and reopened.
    pub fn concat_list(paths: &[PathBuf]) -> String {
        paths
            .iter()
            .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
            .collect()
    }

    /// Final mux: video copied, audio delayed by `intro_secs` and fit to `total`
    pub fn mux_job(&self, video: &Path, audio: &Path, intro_secs: f64, total: f64, output: &Path) -> FfmpegJob {
        let delay_ms = (intro_secs.max(0.0) * 1000.0).round() as u64;
        let filter = format!(
            "[1:a]adelay={delay_ms}:all=1,apad,atrim=0:{total},asetpts=PTS-STARTPTS,\
             aresample={sr},aformat=channel_layouts={layout}[a]",
            total = media::secs(total),
            sr = self.format.sample_rate,
            layout = self.format.channel_layout(),
        );
        FfmpegJob::new("final mux", output)
            .input(video)
            .input(audio)
            .args(["-filter_complex".to_string(), filter])
            .args(["-map", "0:v:0", "-map", "[a]", "-c:v", "copy"])
            .args(self.format.audio_args())
            .args(["-t".to_string(), media::secs(total)])
            .args(["-movflags", "+faststart"])
            .expect_duration(total)
    }

    async fn prepare(&self, clip: &Path, slot: usize) -> Result<(Segment, bool)> {
        if !tokio::fs::try_exists(clip).await.unwrap_or(false) {
            return Err(EngineError::MissingAsset(clip.display().to_string()));
        }
        let info = self.tool.probe(clip).await?;
        if !info.has_video() {
            return Err(EngineError::MissingAsset(format!("{} has no video stream", clip.display())));
        }
        if !self.needs_normalization(&info) {
            return Ok((
                Segment {
                    path: clip.to_path_buf(),
                    duration: info.duration,
                },
                false,
            ));
        }

        debug!("Normalizing {} ({:?}x{:?})", clip.display(), info.width, info.height);
        let output = self.work_dir.join(format!("normalized_{slot:03}.mp4"));
        let job = self.normalize_job(clip, &info, &output);
        let normalized = media::render(self.tool.as_ref(), &job).await?;
        Ok((
            Segment {
                path: output,
                duration: normalized.duration,
            },
            true,
        ))
    }

    /// Join `intro`, `scenes` and `outro` in order and mux `audio` under them
    pub async fn assemble(
        &self,
        intro: Option<&Path>,
        scenes: &[PathBuf],
        outro: Option<&Path>,
        audio: &Path,
        output: &Path,
    ) -> Result<Assembled> {
        if scenes.is_empty() {
            return Err(EngineError::InvalidPlan("nothing to assemble".to_string()));
        }
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let clips: Vec<&Path> = intro
            .into_iter()
            .chain(scenes.iter().map(PathBuf::as_path))
            .chain(outro)
            .collect();

        let mut segments = Vec::with_capacity(clips.len());
        let mut normalized = 0;
        for (slot, clip) in clips.iter().enumerate() {
            let (segment, reencoded) = self.prepare(clip, slot).await?;
            normalized += usize::from(reencoded);
            segments.push(segment);
        }

        let intro_secs = if intro.is_some() { segments[0].duration } else { 0.0 };
        let total: f64 = segments.iter().map(|s| s.duration).sum();
        let paths: Vec<PathBuf> = segments.iter().map(|s| s.path.clone()).collect();

        let list = self.work_dir.join("concat.txt");
        tokio::fs::write(&list, Self::concat_list(&paths)).await?;

        let joined = self.work_dir.join("joined.mp4");
        let concat = FfmpegJob::new("concat", &joined)
            .args(["-f", "concat", "-safe", "0"])
            .input(&list)
            .args(["-c", "copy"])
            .expect_duration(total);
        media::render(self.tool.as_ref(), &concat).await?;

        let temp = self.work_dir.join(format!("final_{}.mp4", uuid::Uuid::new_v4()));
        let mux = self.mux_job(&joined, audio, intro_secs, total, &temp);
        let info = media::render(self.tool.as_ref(), &mux).await?;

        place(&temp, output).await?;
        info!(
            "Assembled {} segments ({} normalized) into {} ({:.2}s)",
            segments.len(),
            normalized,
            output.display(),
            info.duration
        );

        Ok(Assembled {
            path: output.to_path_buf(),
            duration: info.duration,
            normalized,
        })
    }
}

/// Move `temp` to `output`, copying when they are on different filesystems
async fn place(temp: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::rename(temp, output).await.is_err() {
        warn!("Rename into {} failed, copying instead", output.display());
        tokio::fs::copy(temp, output).await?;
        tokio::fs::remove_file(temp).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unused;

    #[async_trait::async_trait]
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

    fn assembler() -> Assembler {
        Assembler::new(Arc::new(Unused), VideoFormat::default(), Path::new("/w"))
    }

    #[test]
    fn canonical_clips_skip_normalization() {
        let a = assembler();
        let format = VideoFormat::default();
        assert!(!a.needs_normalization(&MediaInfo::video(5.0, &format, true)));
        assert!(a.needs_normalization(&MediaInfo::video(5.0, &format, false)));

        let vertical = MediaInfo {
            width: Some(1080),
            height: Some(1920),
            ..MediaInfo::video(5.0, &format, true)
        };
        assert!(a.needs_normalization(&vertical));
    }

    #[test]
    fn same_geometry_hevc_intro_is_normalized() {
        let a = assembler();
        let intro = MediaInfo {
            video_codec: Some("hevc".into()),
            ..MediaInfo::video(3.0, &VideoFormat::default(), true)
        };
        assert!(a.needs_normalization(&intro));
        let job = a.normalize_job(Path::new("intro.mp4"), &intro, Path::new("/w/n.mp4"));
        assert_eq!(job.value_of("-c:v"), Some("libx264"));
    }

    #[test]
    fn silent_clip_gets_generated_audio() {
        let info = MediaInfo {
            duration: 3.0,
            width: Some(1280),
            height: Some(720),
            fps: Some(25.0),
            ..Default::default()
        };
        let job = assembler().normalize_job(Path::new("intro.mov"), &info, Path::new("/w/n.mp4"));
        assert_eq!(job.inputs(), vec!["intro.mov", "anullsrc=r=48000:cl=stereo"]);
        assert!(job.value_of("-filter:v").unwrap().contains("pad=1920:1080"));
        assert_eq!(job.expected_duration, Some(3.0));
    }

    #[test]
    fn concat_list_escapes_quotes() {
        let list = Assembler::concat_list(&[PathBuf::from("/w/a.mp4"), PathBuf::from("/w/it's.mp4")]);
        assert_eq!(list, "file '/w/a.mp4'\nfile '/w/it'\\''s.mp4'\n");
    }

    #[test]
    fn mux_delays_audio_by_intro() {
        let job = assembler().mux_job(Path::new("v.mp4"), Path::new("a.wav"), 2.0, 20.0, Path::new("out.mp4"));
        let graph = job.value_of("-filter_complex").unwrap();
        assert!(graph.starts_with("[1:a]adelay=2000:all=1,apad,atrim=0:20.000"));
        assert_eq!(job.value_of("-c:v"), Some("copy"));
        assert_eq!(job.expected_duration, Some(20.0));
    }
}
