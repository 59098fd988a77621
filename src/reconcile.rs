//! Duration reconciliation between a scene clip and its narration.
//!
//! Clips are only ever slowed down, by at most [`MAX_STRETCH`]. Whatever the
//! stretch cannot cover is filled by holding the last frame, and anything
//! past the target is cut, so the output always plays for `target` seconds.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::media::{self, FfmpegJob, MediaToolchain, VideoFormat};

/// Largest slow-down factor applied to a clip
pub const MAX_STRETCH: f64 = 2.0;
/// Extra hold appended to padded clips so the trim never comes up short
pub const PAD_EPSILON: f64 = 0.1;
/// Shortest target a scene may have
pub const MIN_SCENE_SECS: f64 = 1.0;
/// Scene length used when nothing at all is known about narration timing
pub const DEFAULT_SCENE_SECS: f64 = 5.0;

/// How one clip is retimed to its target
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReconcilePlan {
    pub actual: f64,
    pub target: f64,
    /// `setpts` multiplier in `[1.0, MAX_STRETCH]`
    pub factor: f64,
    /// Seconds of last-frame hold after stretching
    pub pad_secs: f64,
    /// Clip is longer than the target and gets cut
    pub truncate: bool,
}

impl ReconcilePlan {
    pub fn compute(actual: f64, target: f64) -> Result<Self> {
        if !(actual.is_finite() && actual > 0.0) {
            return Err(EngineError::Probe(format!("clip has unusable duration {actual}")));
        }
        if !(target.is_finite() && target > 0.0) {
            return Err(EngineError::InvalidPlan(format!("scene target {target} is not positive")));
        }

        let factor = (target / actual).clamp(1.0, MAX_STRETCH);
        let stretched = actual * factor;
        // Exact stretches still get the epsilon hold: -t does the final cut
        let pad_secs = if stretched < target + PAD_EPSILON {
            (target - stretched).max(0.0) + PAD_EPSILON
        } else {
            0.0
        };

        Ok(Self {
            actual,
            target,
            factor,
            pad_secs,
            truncate: actual > target,
        })
    }

    /// Length after `setpts`, before padding
    pub fn stretched(&self) -> f64 {
        self.actual * self.factor
    }

    /// Video filter chain: retime, hold, then fit to the canonical frame
    pub fn filter(&self, format: &VideoFormat) -> String {
        let mut chain = vec![format!("setpts={:.4}*PTS", self.factor)];
        if self.pad_secs > 0.0 {
            chain.push(format!("tpad=stop_mode=clone:stop_duration={:.3}", self.pad_secs));
        }
        chain.push(format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
            w = format.width,
            h = format.height
        ));
        chain.push(format!("fps={}", format.fps));
        chain.join(",")
    }
}

/// Target length per scene.
///
/// Scenes with measured narration use it. Scenes without share whatever
/// part of `total_narration` is unaccounted for, or the mean of the known
/// scenes, or [`DEFAULT_SCENE_SECS`] when nothing is known.
pub fn target_durations(narration: &[Option<f64>], total_narration: Option<f64>) -> Vec<f64> {
    let known: Vec<f64> = narration.iter().flatten().copied().collect();
    let missing = narration.len() - known.len();
    if missing == 0 {
        return known.into_iter().map(|d| d.max(MIN_SCENE_SECS)).collect();
    }

    let known_sum: f64 = known.iter().sum();
    let mean = (!known.is_empty()).then(|| known_sum / known.len() as f64);
    let share = total_narration
        .map(|total| (total - known_sum).max(0.0) / missing as f64)
        .filter(|s| *s >= MIN_SCENE_SECS)
        .or(mean)
        .unwrap_or(DEFAULT_SCENE_SECS);

    narration
        .iter()
        .map(|d| d.unwrap_or(share).max(MIN_SCENE_SECS))
        .collect()
}

/// Result of retiming one clip
#[derive(Debug, Clone, Serialize)]
pub struct Reconciled {
    pub path: PathBuf,
    pub plan: ReconcilePlan,
    pub duration: f64,
}

/// Retimes clips through the media toolchain
#[derive(Clone)]
pub struct DurationReconciler {
    tool: Arc<dyn MediaToolchain>,
    format: VideoFormat,
}

impl DurationReconciler {
    pub fn new(tool: Arc<dyn MediaToolchain>, format: VideoFormat) -> Self {
        Self { tool, format }
    }

    /// ffmpeg job for an already-computed plan
    pub fn build_job(&self, clip: &Path, plan: &ReconcilePlan, output: &Path, label: &str) -> FfmpegJob {
        FfmpegJob::new(label, output)
            .input(clip)
            .args(self.format.silence_input())
            .args(["-filter:v".to_string(), plan.filter(&self.format)])
            .args(["-map", "0:v:0", "-map", "1:a:0"])
            .args(["-t".to_string(), media::secs(plan.target)])
            .args(self.format.video_args())
            .args(self.format.audio_args())
            .expect_duration(plan.target)
    }

    /// Probe `clip`, retime it to `target` seconds and write `output`
    pub async fn reconcile(&self, clip: &Path, target: f64, output: &Path) -> Result<Reconciled> {
        let actual = self.tool.probe(clip).await?.duration;
        let plan = ReconcilePlan::compute(actual, target)?;
        debug!(
            "Reconcile {}: {:.2}s -> {:.2}s (x{:.3}, pad {:.2}s, truncate {})",
            clip.display(),
            plan.actual,
            plan.target,
            plan.factor,
            plan.pad_secs,
            plan.truncate
        );

        let label = format!("reconcile {}", clip.file_name().map_or_else(String::new, |n| n.to_string_lossy().to_string()));
        let job = self.build_job(clip, &plan, output, &label);
        let info = media::render(self.tool.as_ref(), &job).await?;
        info!("Reconciled clip to {:.2}s (target {:.2}s)", info.duration, target);

        Ok(Reconciled {
            path: output.to_path_buf(),
            plan,
            duration: info.duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn short_clip_is_stretched_within_bounds() {
        let plan = ReconcilePlan::compute(4.0, 6.0).unwrap();
        assert!(approx(plan.factor, 1.5));
        assert!(approx(plan.stretched(), 6.0));
        assert!(approx(plan.pad_secs, PAD_EPSILON));
        assert!(!plan.truncate);
    }

    #[test]
    fn very_short_clip_is_stretched_then_padded() {
        let plan = ReconcilePlan::compute(2.0, 7.0).unwrap();
        assert!(approx(plan.factor, MAX_STRETCH));
        assert!(approx(plan.pad_secs, 7.0 - 4.0 + PAD_EPSILON));
        assert!(plan.stretched() + plan.pad_secs >= plan.target);
    }

    #[test]
    fn long_clip_is_truncated_never_sped_up() {
        let plan = ReconcilePlan::compute(8.0, 5.0).unwrap();
        assert!(approx(plan.factor, 1.0));
        assert!(approx(plan.pad_secs, 0.0));
        assert!(plan.truncate);
    }

    #[test]
    fn factor_always_in_range() {
        for actual in [0.5, 1.0, 3.3, 5.0, 9.9, 30.0] {
            for target in [1.0, 2.5, 5.0, 12.0, 45.0] {
                let plan = ReconcilePlan::compute(actual, target).unwrap();
                assert!((1.0..=MAX_STRETCH).contains(&plan.factor));
                assert!(plan.stretched() + plan.pad_secs >= target - 1e-9);
            }
        }
    }

    #[test]
    fn rejects_degenerate_inputs() {
        assert!(ReconcilePlan::compute(0.0, 5.0).is_err());
        assert!(ReconcilePlan::compute(f64::NAN, 5.0).is_err());
        assert!(ReconcilePlan::compute(5.0, -1.0).is_err());
    }

    #[test]
    fn filter_contains_retime_and_hold() {
        let format = VideoFormat::default();
        let filter = ReconcilePlan::compute(2.0, 7.0).unwrap().filter(&format);
        assert!(filter.starts_with("setpts=2.0000*PTS,tpad=stop_mode=clone:stop_duration=3.100"));
        assert!(filter.contains("scale=1920:1080"));
        assert!(filter.ends_with("fps=30"));
    }

    #[test]
    fn job_trims_to_target_and_replaces_audio_with_silence() {
        struct NoTool;
        #[async_trait::async_trait]
        impl MediaToolchain for NoTool {
            async fn probe(&self, _: &Path) -> Result<crate::media::MediaInfo> {
                unreachable!()
            }
            async fn execute(&self, _: &FfmpegJob) -> Result<()> {
                unreachable!()
            }
            async fn check_available(&self) -> bool {
                false
            }
        }

        let reconciler = DurationReconciler::new(Arc::new(NoTool), VideoFormat::default());
        let plan = ReconcilePlan::compute(4.0, 6.0).unwrap();
        let job = reconciler.build_job(Path::new("in.mp4"), &plan, Path::new("out.mp4"), "t");
        assert_eq!(job.value_of("-t"), Some("6.000"));
        assert_eq!(job.inputs(), vec!["in.mp4", "anullsrc=r=48000:cl=stereo"]);
        assert_eq!(job.value_of("-ar"), Some("48000"));
        assert_eq!(job.expected_duration, Some(6.0));
    }

    #[test]
    fn targets_use_measured_narration() {
        let targets = target_durations(&[Some(4.0), Some(6.0), Some(5.0)], None);
        assert_eq!(targets, vec![4.0, 6.0, 5.0]);
    }

    #[test]
    fn targets_split_unaccounted_total() {
        let targets = target_durations(&[Some(4.0), None, None], Some(16.0));
        assert_eq!(targets, vec![4.0, 6.0, 6.0]);

        let even = target_durations(&[None, None, None, None], Some(20.0));
        assert_eq!(even, vec![5.0; 4]);
    }

    #[test]
    fn targets_fall_back_to_mean_then_default() {
        assert_eq!(target_durations(&[Some(4.0), None, Some(6.0)], None), vec![4.0, 5.0, 6.0]);
        assert_eq!(target_durations(&[None, None], None), vec![DEFAULT_SCENE_SECS; 2]);
    }
}
