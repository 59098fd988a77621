//! Narration track assembly and background music mixing.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::bgm::BgmTrack;
use super::mood::Mood;
use crate::config::AudioConfig;
use crate::error::{EngineError, Result};
use crate::media::{self, FfmpegJob, MediaToolchain, VideoFormat};

/// One slot of the narration track: a speech file or silence, held for `length` seconds
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationSegment {
    pub path: Option<PathBuf>,
    pub length: f64,
}

impl NarrationSegment {
    pub fn speech(path: impl Into<PathBuf>, length: f64) -> Self {
        Self {
            path: Some(path.into()),
            length,
        }
    }

    pub fn silence(length: f64) -> Self {
        Self { path: None, length }
    }
}

/// Final audio bed for the scenes
#[derive(Debug, Clone, Serialize)]
pub struct MixedAudio {
    pub path: PathBuf,
    pub duration: f64,
    /// Mood of the music bed, if one was mixed in
    pub bgm: Option<Mood>,
}

/// Mixes narration with a mood-selected music bed
#[derive(Clone)]
pub struct AudioMixer {
    tool: Arc<dyn MediaToolchain>,
    config: AudioConfig,
    format: VideoFormat,
}

impl AudioMixer {
    pub fn new(tool: Arc<dyn MediaToolchain>, config: AudioConfig, format: VideoFormat) -> Self {
        Self { tool, config, format }
    }

    /// Job that lays segments end to end, each padded or cut to its length
    pub fn build_narration_job(&self, segments: &[NarrationSegment], output: &Path) -> Result<FfmpegJob> {
        if segments.is_empty() {
            return Err(EngineError::MissingAsset("no narration segments".to_string()));
        }

        let sr = self.format.sample_rate;
        let layout = self.format.channel_layout();
        let mut job = FfmpegJob::new("narration track", output);
        let mut graph = Vec::new();
        let mut input = 0;

        for (i, segment) in segments.iter().enumerate() {
            let length = media::secs(segment.length);
            match &segment.path {
                Some(path) => {
                    job = job.input(path);
                    graph.push(format!(
                        "[{input}:a]aresample={sr},aformat=channel_layouts={layout},apad,atrim=0:{length},asetpts=PTS-STARTPTS[s{i}]"
                    ));
                    input += 1;
                }
                None => graph.push(format!(
                    "anullsrc=r={sr}:cl={layout},atrim=0:{length},asetpts=PTS-STARTPTS[s{i}]"
                )),
            }
        }

        let labels: String = (0..segments.len()).map(|i| format!("[s{i}]")).collect();
        graph.push(format!("{labels}concat=n={}:v=0:a=1[out]", segments.len()));

        let total: f64 = segments.iter().map(|s| s.length).sum();
        Ok(job
            .args(["-filter_complex".to_string(), graph.join(";")])
            .args(["-map", "[out]", "-c:a", "pcm_s16le"])
            .expect_duration(total))
    }

    /// Write the concatenated narration track. Returns its duration.
    pub async fn narration_track(&self, segments: &[NarrationSegment], output: &Path) -> Result<f64> {
        let job = self.build_narration_job(segments, output)?;
        let info = media::render(self.tool.as_ref(), &job).await?;
        info!("Narration track: {} segments, {:.2}s", segments.len(), info.duration);
        Ok(info.duration)
    }

    /// Filter graph mixing input 0 (narration) with input 1 (music)
    pub fn mix_filter(&self, narration_duration: f64) -> String {
        let c = &self.config;
        let total = narration_duration + c.fade_out_secs;
        format!(
            "[1:a]aloop=loop=-1:size=2e+09,atrim=0:{total},asetpts=PTS-STARTPTS,\
             afade=t=in:st=0:d={fade_in},afade=t=out:st={fade_start}:d={fade_out},volume={bgm}[bgm];\
             [0:a]volume={narr},apad=whole_dur={total}[narr];\
             [narr][bgm]amix=inputs=2:duration=longest:dropout_transition=0:normalize=0[out]",
            total = media::secs(total),
            fade_in = media::secs(c.fade_in_secs),
            fade_start = media::secs(narration_duration),
            fade_out = media::secs(c.fade_out_secs),
            bgm = c.bgm_gain,
            narr = c.narration_gain,
        )
    }

    /// Mix the music bed under the narration. With no track the narration
    /// is returned untouched.
    pub async fn mix(
        &self,
        narration: &Path,
        narration_duration: f64,
        bgm: Option<&BgmTrack>,
        output: &Path,
    ) -> Result<MixedAudio> {
        let Some(track) = bgm else {
            info!("No background music for this mood, using narration only");
            return Ok(MixedAudio {
                path: narration.to_path_buf(),
                duration: narration_duration,
                bgm: None,
            });
        };

        let expected = narration_duration + self.config.fade_out_secs;
        let job = FfmpegJob::new("bgm mix", output)
            .input(narration)
            .input(&track.path)
            .args(["-filter_complex".to_string(), self.mix_filter(narration_duration)])
            .args(["-map", "[out]", "-c:a", "pcm_s16le"])
            .args(["-ar".to_string(), self.format.sample_rate.to_string()])
            .expect_duration(expected);

        let info = media::render(self.tool.as_ref(), &job).await?;
        info!(
            "Mixed {} music at {:.2} under {:.2}s narration",
            track.mood, self.config.bgm_gain, narration_duration
        );

        Ok(MixedAudio {
            path: output.to_path_buf(),
            duration: info.duration,
            bgm: Some(track.mood),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaInfo;

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

    fn mixer() -> AudioMixer {
        AudioMixer::new(Arc::new(Unused), AudioConfig::default(), VideoFormat::default())
    }

    #[test]
    fn mix_filter_loops_fades_and_mixes() {
        let filter = mixer().mix_filter(15.0);
        assert!(filter.contains("aloop=loop=-1:size=2e+09,atrim=0:17.000"));
        assert!(filter.contains("afade=t=in:st=0:d=1.000"));
        assert!(filter.contains("afade=t=out:st=15.000:d=2.000"));
        assert!(filter.contains("volume=0.12[bgm]"));
        assert!(filter.contains("[0:a]volume=1"));
        assert!(filter.contains("amix=inputs=2"));
    }

    #[test]
    fn narration_job_fills_missing_scenes_with_silence() {
        let segments = vec![
            NarrationSegment::speech("/w/s0.mp3", 4.0),
            NarrationSegment::silence(6.0),
            NarrationSegment::speech("/w/s2.mp3", 5.0),
        ];
        let job = mixer().build_narration_job(&segments, Path::new("/w/narration.wav")).unwrap();
        assert_eq!(job.inputs(), vec!["/w/s0.mp3", "/w/s2.mp3"]);

        let graph = job.value_of("-filter_complex").unwrap();
        assert!(graph.contains("[0:a]aresample=48000"));
        assert!(graph.contains("anullsrc=r=48000:cl=stereo,atrim=0:6.000"));
        assert!(graph.contains("[1:a]aresample=48000"));
        assert!(graph.contains("[s0][s1][s2]concat=n=3:v=0:a=1[out]"));
        assert_eq!(job.expected_duration, Some(15.0));
    }

    #[test]
    fn narration_job_rejects_empty() {
        assert!(mixer().build_narration_job(&[], Path::new("/w/n.wav")).is_err());
    }

    #[tokio::test]
    async fn no_track_passes_narration_through() {
        let mixed = mixer()
            .mix(Path::new("/w/narration.wav"), 12.5, None, Path::new("/w/mixed.wav"))
            .await
            .unwrap();
        assert_eq!(mixed.path, PathBuf::from("/w/narration.wav"));
        assert!((mixed.duration - 12.5).abs() < f64::EPSILON);
        assert!(mixed.bgm.is_none());
    }
}
