//! Visual clip acquisition
//!
//! Each scene gets exactly one clip. The premium generator is tried first
//! when it is enabled and within budget; any failure drops to the local
//! [`DeterministicAnimator`]. Running out of premium quota switches premium
//! off for the rest of the run.

pub mod animator;
pub mod premium;
pub mod stills;
pub mod variation;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::PremiumConfig;
use crate::error::{EngineError, Result};
use crate::media::MediaToolchain;
use crate::plan::Scene;
use crate::quota::ProviderGate;

pub use animator::{DeterministicAnimator, MotionPreset};
pub use premium::{ClipGenerator, ClipRequest, HttpClipGenerator, JobId, JobStatus};
pub use stills::{still_prompt, DirectoryStills, StillSource};
pub use variation::VariationPicker;

/// Which path produced an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Premium,
    Fallback,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Premium => "premium",
            Self::Fallback => "fallback",
        })
    }
}

/// Outcome of one generation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub asset_path: Option<PathBuf>,
    /// Seconds; 0 when nothing was produced
    pub duration: f64,
    pub error: Option<String>,
    pub provider: Provider,
}

impl GenerationResult {
    pub fn ok(asset_path: PathBuf, duration: f64, provider: Provider) -> Self {
        Self {
            success: true,
            asset_path: Some(asset_path),
            duration,
            error: None,
            provider,
        }
    }

    pub fn failed(error: impl Into<String>, provider: Provider) -> Self {
        Self {
            success: false,
            asset_path: None,
            duration: 0.0,
            error: Some(error.into()),
            provider,
        }
    }
}

/// Motion prompt: camera move, then scene intent, then the plan's look
pub fn motion_prompt(camera: &str, intent: &str, style: Option<&str>) -> String {
    let mut parts = vec![camera.trim()];
    if !intent.trim().is_empty() {
        parts.push(intent.trim());
    }
    if let Some(style) = style.filter(|s| !s.trim().is_empty()) {
        parts.push(style.trim());
    }
    parts.retain(|p| !p.is_empty());
    parts.join(", ")
}

/// Plan-level text needed to describe a scene to generators
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipContext<'a> {
    pub headline: &'a str,
    pub visual_style: Option<&'a str>,
}

/// Clip plus whatever degradations happened on the way
#[derive(Debug, Clone)]
pub struct ClipOutcome {
    pub result: GenerationResult,
    /// Human readable reasons the preferred path was not used
    pub degraded: Vec<String>,
    /// Set once, on the call that switched premium off
    pub notice: Option<String>,
}

struct PremiumPath {
    generator: Arc<dyn ClipGenerator>,
    gate: ProviderGate,
    poll_interval: Duration,
    timeout: Duration,
    motions: Mutex<VariationPicker<String>>,
}

/// Produces one clip per scene, premium first, animated still otherwise
pub struct VisualClipProvider {
    tool: Arc<dyn MediaToolchain>,
    animator: DeterministicAnimator,
    stills: Arc<dyn StillSource>,
    premium: Option<PremiumPath>,
    premium_disabled: AtomicBool,
}

impl VisualClipProvider {
    pub fn new(tool: Arc<dyn MediaToolchain>, animator: DeterministicAnimator, stills: Arc<dyn StillSource>) -> Self {
        Self {
            tool,
            animator,
            stills,
            premium: None,
            premium_disabled: AtomicBool::new(false),
        }
    }

    /// Enable the premium path. `gate` carries the clip quota and spacing.
    #[must_use]
    pub fn with_premium(mut self, generator: Arc<dyn ClipGenerator>, gate: ProviderGate, config: &PremiumConfig) -> Self {
        self.premium = Some(PremiumPath {
            generator,
            gate,
            poll_interval: Duration::from_secs_f64(config.poll_interval_secs.max(0.01)),
            timeout: Duration::from_secs_f64(config.timeout_secs.max(1.0)),
            motions: Mutex::new(VariationPicker::new(config.motion_prompts.clone(), config.seed)),
        });
        self
    }

    /// Whether the premium path would be attempted for the next scene
    pub fn premium_active(&self) -> bool {
        self.premium.is_some() && !self.premium_disabled.load(Ordering::SeqCst)
    }

    /// Switch premium off for the remainder of the run
    pub fn disable_premium(&self) -> bool {
        !self.premium_disabled.swap(true, Ordering::SeqCst)
    }

    /// Acquire a clip of roughly `target_hint` seconds for `scene`, written under `work_dir`
    pub async fn acquire_clip(&self, scene: &Scene, target_hint: f64, context: &ClipContext<'_>, work_dir: &Path) -> ClipOutcome {
        let mut degraded = Vec::new();
        let mut notice = None;

        let prompt = still_prompt(scene, context.headline);
        let still = match self.stills.still_for(scene, &prompt).await {
            Ok(still) => still,
            Err(e) => {
                warn!("Still for scene {} unavailable: {}", scene.index() + 1, e);
                degraded.push(format!("still unavailable: {e}"));
                None
            }
        };

        if let Some(premium) = self.premium.as_ref().filter(|_| self.premium_active()) {
            let output = work_dir.join(format!("scene_{}_premium.mp4", scene.index()));
            match self
                .generate_premium(premium, scene, still.as_deref(), target_hint, context, &output)
                .await
            {
                Ok(result) => {
                    return ClipOutcome {
                        result,
                        degraded,
                        notice,
                    }
                }
                Err(e) if e.is_quota() => {
                    warn!("Premium quota exhausted at scene {}: {}", scene.index() + 1, e);
                    if self.disable_premium() {
                        notice = Some(format!("premium video disabled for the rest of the run: {e}"));
                    }
                    degraded.push(format!("premium skipped: {e}"));
                }
                Err(e) => {
                    warn!("Premium clip for scene {} failed: {}", scene.index() + 1, e);
                    degraded.push(format!("premium failed: {e}"));
                }
            }
        }

        let result = match still {
            Some(still) => {
                let output = work_dir.join(format!("scene_{}_animated.mp4", scene.index()));
                match self.animator.animate(&still, scene.index(), target_hint, &output).await {
                    Ok(duration) => GenerationResult::ok(output, duration, Provider::Fallback),
                    Err(e) => GenerationResult::failed(e.to_string(), Provider::Fallback),
                }
            }
            None => GenerationResult::failed(
                EngineError::MissingAsset(format!("no still image for scene {}", scene.index() + 1)).to_string(),
                Provider::Fallback,
            ),
        };

        ClipOutcome {
            result,
            degraded,
            notice,
        }
    }

    async fn generate_premium(
        &self,
        premium: &PremiumPath,
        scene: &Scene,
        still: Option<&Path>,
        target_hint: f64,
        context: &ClipContext<'_>,
        output: &Path,
    ) -> Result<GenerationResult> {
        let camera = premium
            .motions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pick()
            .cloned()
            .unwrap_or_default();
        let request = ClipRequest {
            scene_index: scene.index(),
            prompt: still_prompt(scene, context.headline),
            motion_prompt: motion_prompt(&camera, scene.visual_intent(), context.visual_style),
            still: still.map(Path::to_path_buf),
            duration_hint: target_hint,
        };

        let generator = premium.generator.as_ref();
        let label = format!("scene {} clip", scene.index() + 1);
        let job = premium.gate.call(1, &label, || generator.submit(&request)).await?;

        let wait = tokio::time::timeout(premium.timeout, async {
            loop {
                tokio::time::sleep(premium.poll_interval).await;
                match generator.poll(&job).await {
                    Ok(JobStatus::Succeeded) => return Ok(()),
                    Ok(JobStatus::Failed(reason)) => {
                        return Err(EngineError::provider(generator.provider_id(), format!("task {job} failed: {reason}")))
                    }
                    Ok(JobStatus::Pending) => {}
                    Err(e) if e.is_transient() => warn!("Polling task {}: {}", job, e),
                    Err(e) => return Err(e),
                }
            }
        })
        .await;
        match wait {
            Ok(outcome) => outcome?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    what: label,
                    secs: premium.timeout.as_secs_f64(),
                })
            }
        }

        generator.download(&job, output).await?;
        let info = self.tool.probe(output).await?;
        if !info.has_video() || info.duration <= 0.0 {
            return Err(EngineError::provider(generator.provider_id(), "downloaded clip has no video"));
        }
        info!("Premium clip for scene {} ready ({:.1}s)", scene.index() + 1, info.duration);
        Ok(GenerationResult::ok(output.to_path_buf(), info.duration, Provider::Premium))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{FfmpegJob, MediaInfo, VideoFormat};
    use crate::plan::ScenePlan;
    use crate::quota::{QuotaTracker, RateLimiter};
    use std::sync::atomic::AtomicU32;

    /// Writes empty outputs and reports the promised duration on probe
    struct Fake {
        durations: tokio::sync::Mutex<std::collections::HashMap<PathBuf, f64>>,
    }

    #[async_trait::async_trait]
    impl MediaToolchain for Fake {
        async fn probe(&self, path: &Path) -> Result<MediaInfo> {
            let d = self.durations.lock().await.get(path).copied().unwrap_or(8.0);
            Ok(MediaInfo::video(d, &VideoFormat::default(), false))
        }
        async fn execute(&self, job: &FfmpegJob) -> Result<()> {
            if let Some(d) = job.expected_duration {
                self.durations.lock().await.insert(job.output.clone(), d);
            }
            Ok(())
        }
        async fn check_available(&self) -> bool {
            true
        }
    }

    struct FixedStill(Option<PathBuf>);

    #[async_trait::async_trait]
    impl StillSource for FixedStill {
        async fn still_for(&self, _: &Scene, _: &str) -> Result<Option<PathBuf>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Premium {
        fail: bool,
        /// Never leaves `Pending`
        stuck: bool,
        /// Polls answered with a throttling response before the real status
        throttled_polls: u32,
        submits: AtomicU32,
        polls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ClipGenerator for Premium {
        fn provider_id(&self) -> &str {
            "premium-video"
        }
        async fn submit(&self, _: &ClipRequest) -> Result<JobId> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(JobId("t1".into()))
        }
        async fn poll(&self, _: &JobId) -> Result<JobStatus> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n < self.throttled_polls {
                return Err(premium::classify_rejection(
                    "premium-video",
                    premium::Call::Poll,
                    reqwest::StatusCode::TOO_MANY_REQUESTS,
                    "slow down",
                ));
            }
            Ok(if self.stuck {
                JobStatus::Pending
            } else if self.fail {
                JobStatus::Failed("content policy".into())
            } else {
                JobStatus::Succeeded
            })
        }
        async fn download(&self, _: &JobId, _: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn provider(still: Option<PathBuf>) -> VisualClipProvider {
        let tool: Arc<dyn MediaToolchain> = Arc::new(Fake {
            durations: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        });
        let animator = DeterministicAnimator::new(tool.clone(), VideoFormat::default(), 60.0);
        VisualClipProvider::new(tool, animator, Arc::new(FixedStill(still)))
    }

    fn config() -> PremiumConfig {
        PremiumConfig {
            enabled: true,
            poll_interval_secs: 0.01,
            seed: Some(3),
            ..Default::default()
        }
    }

    fn scene() -> Scene {
        ScenePlan::from_json(r#"{"scenes": [{"narration": "a", "visual_description": "harbour"}]}"#)
            .unwrap()
            .scenes()[0]
            .clone()
    }

    #[test]
    fn motion_prompt_joins_present_parts() {
        assert_eq!(motion_prompt("Gentle dolly forward", "harbour", Some("film grain")), "Gentle dolly forward, harbour, film grain");
        assert_eq!(motion_prompt("Pan", "", None), "Pan");
    }

    #[tokio::test]
    async fn fallback_without_premium() {
        let p = provider(Some(PathBuf::from("/stills/a.png")));
        let outcome = p.acquire_clip(&scene(), 6.0, &ClipContext::default(), Path::new("/w")).await;
        assert!(outcome.result.success);
        assert_eq!(outcome.result.provider, Provider::Fallback);
        assert_eq!(outcome.result.duration, 6.0);
        assert!(outcome.degraded.is_empty());
    }

    #[tokio::test]
    async fn missing_still_fails_fallback() {
        let outcome = provider(None)
            .acquire_clip(&scene(), 6.0, &ClipContext::default(), Path::new("/w"))
            .await;
        assert!(!outcome.result.success);
        assert!(outcome.result.error.unwrap().contains("no still image"));
    }

    #[tokio::test]
    async fn premium_success_is_used() {
        let gate = ProviderGate::new("premium-video", Arc::new(RateLimiter::new()));
        let p = provider(None).with_premium(
            Arc::new(Premium::default()),
            gate,
            &config(),
        );
        let outcome = p.acquire_clip(&scene(), 6.0, &ClipContext::default(), Path::new("/w")).await;
        assert!(outcome.result.success);
        assert_eq!(outcome.result.provider, Provider::Premium);
    }

    #[tokio::test]
    async fn premium_failure_falls_back() {
        let gate = ProviderGate::new("premium-video", Arc::new(RateLimiter::new()));
        let p = provider(Some(PathBuf::from("/stills/a.png"))).with_premium(
            Arc::new(Premium {
                fail: true,
                ..Default::default()
            }),
            gate,
            &config(),
        );
        let outcome = p.acquire_clip(&scene(), 5.0, &ClipContext::default(), Path::new("/w")).await;
        assert!(outcome.result.success);
        assert_eq!(outcome.result.provider, Provider::Fallback);
        assert!(outcome.degraded[0].contains("content policy"));
        assert!(p.premium_active());
    }

    #[tokio::test]
    async fn exhausted_quota_disables_premium_once() {
        let dir = std::env::temp_dir().join(format!("scenecast-visual-{}", uuid::Uuid::new_v4()));
        let quota = QuotaTracker::open_for_period(&dir, "premium-video", 0, "2026-05").await.unwrap();
        let gate = ProviderGate::new("premium-video", Arc::new(RateLimiter::new())).with_quota(Arc::new(quota));
        let generator = Arc::new(Premium::default());
        let p = provider(Some(PathBuf::from("/stills/a.png"))).with_premium(generator.clone(), gate, &config());

        let first = p.acquire_clip(&scene(), 5.0, &ClipContext::default(), Path::new("/w")).await;
        assert_eq!(first.result.provider, Provider::Fallback);
        assert!(first.notice.is_some());
        assert!(!p.premium_active());

        let second = p.acquire_clip(&scene(), 5.0, &ClipContext::default(), Path::new("/w")).await;
        assert!(second.notice.is_none());
        assert!(second.degraded.is_empty());
        assert_eq!(generator.submits.load(Ordering::SeqCst), 0);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_polls_keep_premium_active() {
        let gate = ProviderGate::new("premium-video", Arc::new(RateLimiter::new()));
        let generator = Arc::new(Premium {
            throttled_polls: 2,
            ..Default::default()
        });
        let p = provider(Some(PathBuf::from("/stills/a.png"))).with_premium(generator.clone(), gate, &config());

        let outcome = p.acquire_clip(&scene(), 5.0, &ClipContext::default(), Path::new("/w")).await;
        assert_eq!(outcome.result.provider, Provider::Premium);
        assert!(outcome.notice.is_none());
        assert!(p.premium_active());
        assert_eq!(generator.polls.load(Ordering::SeqCst), 3);
        assert_eq!(generator.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_times_out_into_fallback() {
        let gate = ProviderGate::new("premium-video", Arc::new(RateLimiter::new()));
        let generator = Arc::new(Premium {
            stuck: true,
            ..Default::default()
        });
        let config = PremiumConfig {
            poll_interval_secs: 5.0,
            timeout_secs: 30.0,
            ..config()
        };
        let p = provider(Some(PathBuf::from("/stills/a.png"))).with_premium(generator.clone(), gate, &config);

        let outcome = p.acquire_clip(&scene(), 5.0, &ClipContext::default(), Path::new("/w")).await;
        assert!(outcome.result.success);
        assert_eq!(outcome.result.provider, Provider::Fallback);
        assert!(outcome.degraded[0].contains("timed out"));
        assert!(p.premium_active());
        assert!(generator.polls.load(Ordering::SeqCst) >= 5);
    }
}
