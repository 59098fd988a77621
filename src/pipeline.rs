//! Pipeline orchestration
//!
//! A run walks a fixed sequence of stages:
//!
//! ```text
//! PLANNED → ACQUIRING_AUDIO → ACQUIRING_VISUALS → RECONCILING → COMPOSITING
//!         → MIXING → ASSEMBLING → DONE
//! ```
//!
//! `FAILED` is reachable from every stage. Visual, reconcile and overlay
//! problems only degrade the scene they happen in. A run fails when no scene
//! gets narration, when a quota rejects narration, or when the final
//! assembly cannot be produced.

use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::assemble::Assembler;
use crate::audio::{AudioMixer, BgmCatalog, MixedAudio, MoodClassifier, MoodProfile, NarrationSegment};
use crate::captions::CaptionTrack;
use crate::compose::{CardKind, OverlayCompositor, SceneOverlay, TitleCards};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::media::{FfmpegToolchain, MediaToolchain};
use crate::narration::{CommandSynthesizer, NarrationSynthesizer};
use crate::plan::{Scene, ScenePlan};
use crate::quota::{ProviderGate, QuotaTracker, RateLimiter, RetryPolicy};
use crate::reconcile::{target_durations, DurationReconciler};
use crate::visual::{
    ClipContext, ClipGenerator, DeterministicAnimator, DirectoryStills, GenerationResult, HttpClipGenerator, Provider,
    StillSource, VisualClipProvider,
};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Planned,
    AcquiringAudio,
    AcquiringVisuals,
    Reconciling,
    Compositing,
    Mixing,
    Assembling,
    Done,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Planned => "PLANNED",
            Self::AcquiringAudio => "ACQUIRING_AUDIO",
            Self::AcquiringVisuals => "ACQUIRING_VISUALS",
            Self::Reconciling => "RECONCILING",
            Self::Compositing => "COMPOSITING",
            Self::Mixing => "MIXING",
            Self::Assembling => "ASSEMBLING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// What happened to one scene
#[derive(Debug, Clone, Serialize)]
pub struct SceneReport {
    pub index: usize,
    /// Narration attempt; `None` if the run stopped before it
    pub narration: Option<GenerationResult>,
    pub clip: GenerationResult,
    /// Path that produced the visuals
    pub provider: Provider,
    pub target_duration: f64,
    /// Overlay was burned in
    pub composed: bool,
    pub degraded: Vec<String>,
}

/// Outcome of a run. Always returned, never raised.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    pub final_video_path: Option<PathBuf>,
    pub total_duration: f64,
    pub per_scene_results: Vec<SceneReport>,
    pub error: Option<String>,
    /// Every stage entered, in order
    pub stages: Vec<Stage>,
    pub mood: Option<MoodProfile>,
    pub notices: Vec<String>,
    pub captions_path: Option<PathBuf>,
}

/// Per-run switches
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output: PathBuf,
    /// Show the BREAKING label on the headline banner
    pub is_breaking: bool,
}

/// Timestamped output name for a run
pub fn default_output_name() -> String {
    format!("scenecast_{}.mp4", Local::now().format("%Y%m%d_%H%M%S"))
}

/// External pieces a pipeline is built from
pub struct Collaborators {
    pub tool: Arc<dyn MediaToolchain>,
    pub synthesizer: Arc<dyn NarrationSynthesizer>,
    pub stills: Arc<dyn StillSource>,
    pub premium: Option<Arc<dyn ClipGenerator>>,
    pub narration_quota: Option<Arc<QuotaTracker>>,
    pub premium_quota: Option<Arc<QuotaTracker>>,
    pub limiter: Arc<RateLimiter>,
    pub bgm: BgmCatalog,
}

/// Mutable bookkeeping for one run
#[derive(Default)]
struct RunState {
    stages: Vec<Stage>,
    notices: Vec<String>,
    narration: Vec<Option<GenerationResult>>,
    reports: Vec<SceneReport>,
    mood: Option<MoodProfile>,
    captions_path: Option<PathBuf>,
}

impl RunState {
    fn enter(&mut self, stage: Stage) {
        info!("Stage {}", stage);
        self.stages.push(stage);
    }

    fn notice(&mut self, message: String) {
        warn!("{}", message);
        self.notices.push(message);
    }
}

/// Narration acquired for the plan
struct NarrationOutcome {
    /// Per scene: speech path and length
    speech: Vec<Option<(PathBuf, f64)>>,
    closing: Option<(PathBuf, f64)>,
}

/// Drives one scene plan through all stages
pub struct PipelineOrchestrator {
    config: EngineConfig,
    tool: Arc<dyn MediaToolchain>,
    synthesizer: Arc<dyn NarrationSynthesizer>,
    narration_gate: ProviderGate,
    visuals: VisualClipProvider,
    reconciler: DurationReconciler,
    compositor: OverlayCompositor,
    cards: TitleCards,
    mixer: AudioMixer,
    classifier: MoodClassifier,
    bgm: BgmCatalog,
    startup_notices: Vec<String>,
}

impl PipelineOrchestrator {
    pub fn new(config: EngineConfig, deps: Collaborators) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        let format = config.video.clone();
        let tool = deps.tool;

        let mut narration_gate =
            ProviderGate::new(deps.synthesizer.provider_id(), deps.limiter.clone()).with_retry(retry.clone());
        if let Some(quota) = deps.narration_quota {
            narration_gate = narration_gate.with_quota(quota);
        }

        let animator = DeterministicAnimator::new(tool.clone(), format.clone(), config.fallback.max_clip_secs);
        let mut visuals = VisualClipProvider::new(tool.clone(), animator, deps.stills);
        if let Some(generator) = deps.premium {
            let mut gate = ProviderGate::new(generator.provider_id(), deps.limiter).with_retry(retry);
            if let Some(quota) = deps.premium_quota {
                gate = gate.with_quota(quota);
            }
            visuals = visuals.with_premium(generator, gate, &config.premium);
        }

        Self {
            reconciler: DurationReconciler::new(tool.clone(), format.clone()),
            compositor: OverlayCompositor::new(tool.clone(), config.overlay.clone(), format.clone()),
            cards: TitleCards::new(tool.clone(), config.overlay.clone(), config.assembly.clone(), format.clone()),
            mixer: AudioMixer::new(tool.clone(), config.audio.clone(), format),
            classifier: MoodClassifier::new(),
            bgm: deps.bgm,
            synthesizer: deps.synthesizer,
            narration_gate,
            visuals,
            tool,
            config,
            startup_notices: Vec::new(),
        }
    }

    /// Build with the system toolchain, the configured TTS command, stills
    /// directory, quota files and music catalog. `allow_premium` lets the
    /// caller veto premium video for this run.
    pub async fn from_config(config: EngineConfig, allow_premium: bool) -> Result<Self> {
        let tool: Arc<dyn MediaToolchain> = Arc::new(FfmpegToolchain::new());
        let quota_dir = config.paths.quota_dir.clone();
        let mut notices = Vec::new();

        let narration = &config.narration;
        let mut limiter = RateLimiter::new().with_interval(
            &narration.provider_id,
            Duration::from_secs_f64(narration.min_interval_secs.max(0.0)),
        );
        let narration_quota =
            QuotaTracker::open(&quota_dir, &narration.provider_id, narration.monthly_char_limit).await?;

        let mut premium: Option<Arc<dyn ClipGenerator>> = None;
        let mut premium_quota = None;
        if config.premium.enabled && allow_premium {
            match HttpClipGenerator::from_config(&config.premium) {
                Ok(generator) => {
                    limiter = limiter.with_interval(
                        &config.premium.provider_id,
                        Duration::from_secs_f64(config.premium.min_interval_secs.max(0.0)),
                    );
                    premium_quota = Some(Arc::new(
                        QuotaTracker::open(&quota_dir, &config.premium.provider_id, config.premium.monthly_clip_limit)
                            .await?,
                    ));
                    premium = Some(Arc::new(generator));
                }
                Err(e) => notices.push(format!("premium video unavailable: {e}")),
            }
        }

        let bgm = BgmCatalog::scan(tool.as_ref(), &config.audio.bgm_dir).await;
        let deps = Collaborators {
            synthesizer: Arc::new(CommandSynthesizer::new(&config.narration, tool.clone())),
            stills: Arc::new(DirectoryStills::new(config.paths.stills_dir.as_deref())),
            premium,
            narration_quota: Some(Arc::new(narration_quota)),
            premium_quota,
            limiter: Arc::new(limiter),
            bgm,
            tool,
        };

        let mut orchestrator = Self::new(config, deps);
        orchestrator.startup_notices = notices;
        Ok(orchestrator)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `plan` to completion. Failures are reported in the result.
    pub async fn run(&self, mut plan: ScenePlan, options: &RunOptions) -> PipelineResult {
        let mut state = RunState {
            notices: self.startup_notices.clone(),
            ..Default::default()
        };
        let work_dir = self
            .config
            .paths
            .work_dir
            .join(format!("run_{}", uuid::Uuid::new_v4().simple()));

        let outcome = self.execute(&mut plan, options, &work_dir, &mut state).await;
        match outcome {
            Ok(total_duration) => {
                state.enter(Stage::Done);
                if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
                    debug!("Leaving work dir {}: {}", work_dir.display(), e);
                }
                PipelineResult {
                    success: true,
                    final_video_path: Some(options.output.clone()),
                    total_duration,
                    per_scene_results: state.reports,
                    error: None,
                    stages: state.stages,
                    mood: state.mood,
                    notices: state.notices,
                    captions_path: state.captions_path,
                }
            }
            Err(e) => {
                error!("Pipeline failed: {}", e);
                state.enter(Stage::Failed);
                PipelineResult {
                    success: false,
                    final_video_path: None,
                    total_duration: 0.0,
                    per_scene_results: state.reports,
                    error: Some(e.to_string()),
                    stages: state.stages,
                    mood: state.mood,
                    notices: state.notices,
                    captions_path: None,
                }
            }
        }
    }

    async fn execute(
        &self,
        plan: &mut ScenePlan,
        options: &RunOptions,
        work_dir: &Path,
        state: &mut RunState,
    ) -> Result<f64> {
        state.enter(Stage::Planned);
        tokio::fs::create_dir_all(work_dir).await?;
        info!("Run of {} scenes in {}", plan.len(), work_dir.display());

        state.enter(Stage::AcquiringAudio);
        let narration = self.acquire_narration(plan, work_dir, state).await?;

        let measured: Vec<Option<f64>> = plan.scenes().iter().map(|s| s.narration_duration).collect();
        let mut targets = target_durations(&measured, None);
        let closing_secs = narration.closing.as_ref().map_or(0.0, |(_, d)| *d);
        if let Some(last) = targets.last_mut() {
            *last += closing_secs;
        }

        state.enter(Stage::AcquiringVisuals);
        let context = ClipContext {
            headline: &plan.headline,
            visual_style: plan.visual_style.as_deref(),
        };
        let mut clips = Vec::with_capacity(plan.len());
        for (scene, target) in plan.scenes().iter().zip(&targets) {
            let outcome = self.visuals.acquire_clip(scene, *target, &context, work_dir).await;
            if let Some(notice) = outcome.notice {
                state.notice(notice);
            }
            let narration = state.narration.get(scene.index()).cloned().flatten();
            state.reports.push(SceneReport {
                index: scene.index(),
                narration,
                provider: outcome.result.provider,
                clip: outcome.result,
                target_duration: *target,
                composed: false,
                degraded: outcome.degraded,
            });
            clips.push(state.reports[scene.index()].clip.asset_path.clone());
        }
        for (scene, clip) in plan.scenes_mut().iter_mut().zip(&clips) {
            scene.clip_path.clone_from(clip);
        }

        state.enter(Stage::Reconciling);
        let mut reconciled = Vec::with_capacity(plan.len());
        for scene in plan.scenes() {
            let i = scene.index();
            let path = self
                .reconcile_scene(scene, targets[i], work_dir, &mut state.reports[i])
                .await?;
            reconciled.push(path);
        }

        state.enter(Stage::Compositing);
        let mut composed = Vec::with_capacity(plan.len());
        for scene in plan.scenes() {
            let i = scene.index();
            let path = self
                .composite_scene(plan, scene, &reconciled[i], options, work_dir, &mut state.reports[i])
                .await;
            composed.push(path);
        }
        for (scene, path) in plan.scenes_mut().iter_mut().zip(&composed) {
            scene.composed_path = Some(path.clone());
        }

        state.enter(Stage::Mixing);
        let audio = self.mix_audio(plan, &narration, &targets, closing_secs, work_dir, state).await?;

        state.enter(Stage::Assembling);
        let intro = self.bookend(CardKind::Intro, work_dir, state).await;
        let outro = self.bookend(CardKind::Outro, work_dir, state).await;
        let assembler = Assembler::new(self.tool.clone(), self.config.video.clone(), work_dir);
        let assembled = assembler
            .assemble(intro.as_deref(), &composed, outro.as_deref(), &audio.path, &options.output)
            .await?;

        if self.config.assembly.captions_sidecar {
            self.write_captions(plan, &narration, &targets, closing_secs, intro.is_some(), options, state)
                .await;
        }

        Ok(assembled.duration)
    }

    async fn acquire_narration(
        &self,
        plan: &mut ScenePlan,
        work_dir: &Path,
        state: &mut RunState,
    ) -> Result<NarrationOutcome> {
        let voice = self.config.narration.voice.as_str();
        let style = self.config.narration.style.as_deref();
        let synth = self.synthesizer.as_ref();
        let mut speech = Vec::with_capacity(plan.len());

        for scene in plan.scenes_mut() {
            let output = work_dir.join(format!("narration_{}.mp3", scene.index()));
            let text = scene.narration_text().to_string();
            let label = format!("scene {} narration", scene.index() + 1);
            let units = synth.billable_units(&text);

            match self
                .narration_gate
                .call(units, &label, || synth.synthesize(&text, voice, style, &output))
                .await
            {
                Ok(narration) => {
                    scene.narration_duration = Some(narration.duration);
                    state.narration.push(Some(GenerationResult::ok(
                        narration.path.clone(),
                        narration.duration,
                        Provider::Premium,
                    )));
                    speech.push(Some((narration.path, narration.duration)));
                }
                Err(e) if e.is_quota() => return Err(e),
                Err(e) => {
                    warn!("Narration for scene {} failed: {}", scene.index() + 1, e);
                    state.narration.push(Some(GenerationResult::failed(e.to_string(), Provider::Premium)));
                    speech.push(None);
                }
            }
        }

        if speech.iter().all(Option::is_none) {
            return Err(EngineError::provider(
                self.narration_gate.provider(),
                "narration failed for every scene",
            ));
        }

        let closing = match plan.closing_text.as_deref() {
            Some(text) => {
                let output = work_dir.join("narration_closing.mp3");
                match self
                    .narration_gate
                    .call(synth.billable_units(text), "closing narration", || {
                        synth.synthesize(text, voice, style, &output)
                    })
                    .await
                {
                    Ok(narration) => Some((narration.path, narration.duration)),
                    Err(e) if e.is_quota() => return Err(e),
                    Err(e) => {
                        state.notice(format!("closing narration skipped: {e}"));
                        None
                    }
                }
            }
            None => None,
        };

        Ok(NarrationOutcome { speech, closing })
    }

    /// Retime the scene's clip, or render a placeholder card when that is impossible
    async fn reconcile_scene(&self, scene: &Scene, target: f64, work_dir: &Path, report: &mut SceneReport) -> Result<PathBuf> {
        let i = scene.index();
        if let Some(clip) = &report.clip.asset_path {
            let output = work_dir.join(format!("scene_{i}_reconciled.mp4"));
            match self.reconciler.reconcile(clip, target, &output).await {
                Ok(reconciled) => return Ok(reconciled.path),
                Err(e) => {
                    warn!("Reconcile of scene {} failed: {}", i + 1, e);
                    report.degraded.push(format!("reconcile failed: {e}"));
                }
            }
        } else {
            report.degraded.push(format!(
                "no visual: {}",
                report.clip.error.as_deref().unwrap_or("unknown error")
            ));
        }

        let caption = Some(scene.visual_intent()).filter(|s| !s.is_empty());
        let output = work_dir.join(format!("scene_{i}_placeholder.mp4"));
        self.cards.render(CardKind::Placeholder, caption, target, &output).await?;
        report.degraded.push("placeholder card".to_string());
        Ok(output)
    }

    /// Burn the overlay in; on failure the reconciled clip is used as is
    async fn composite_scene(
        &self,
        plan: &ScenePlan,
        scene: &Scene,
        reconciled: &Path,
        options: &RunOptions,
        work_dir: &Path,
        report: &mut SceneReport,
    ) -> PathBuf {
        if !self.config.overlay.enabled {
            return reconciled.to_path_buf();
        }
        let overlay = SceneOverlay {
            headline: &plan.headline,
            sub_headline: &plan.sub_headline,
            caption: scene.narration_text(),
            emphasis: scene.emphasis_word(),
            is_breaking: options.is_breaking,
            scene_index: scene.index(),
        };
        let output = work_dir.join(format!("scene_{}_composed.mp4", scene.index()));
        match self.compositor.compose(reconciled, &overlay, &output).await {
            Ok(layout) => {
                if layout.truncated {
                    report.degraded.push("overlay text truncated".to_string());
                }
                report.composed = true;
                output
            }
            Err(e) => {
                warn!("Overlay for scene {} failed: {}", scene.index() + 1, e);
                report.degraded.push(format!("overlay failed: {e}"));
                reconciled.to_path_buf()
            }
        }
    }

    async fn mix_audio(
        &self,
        plan: &ScenePlan,
        narration: &NarrationOutcome,
        targets: &[f64],
        closing_secs: f64,
        work_dir: &Path,
        state: &mut RunState,
    ) -> Result<MixedAudio> {
        let last = targets.len().saturating_sub(1);
        let mut segments: Vec<NarrationSegment> = narration
            .speech
            .iter()
            .zip(targets)
            .enumerate()
            .map(|(i, (speech, target))| {
                let length = if i == last { target - closing_secs } else { *target };
                match speech {
                    Some((path, _)) => NarrationSegment::speech(path, length),
                    None => NarrationSegment::silence(length),
                }
            })
            .collect();
        if let Some((path, length)) = &narration.closing {
            segments.push(NarrationSegment::speech(path, *length));
        }

        let track = work_dir.join("narration_track.wav");
        let narration_secs = self.mixer.narration_track(&segments, &track).await?;

        let mood = self.classifier.classify(&plan.headline, &plan.full_narration());
        info!("Mood: {} (score {})", mood.mood, mood.score);
        state.mood = Some(mood);

        let bgm = self.bgm.select(mood.mood, self.config.audio.neutral_fallback);
        let mixed_path = work_dir.join("mixed.wav");
        match self.mixer.mix(&track, narration_secs, bgm, &mixed_path).await {
            Ok(mixed) => Ok(mixed),
            Err(e) => {
                state.notice(format!("background music skipped: {e}"));
                Ok(MixedAudio {
                    path: track,
                    duration: narration_secs,
                    bgm: None,
                })
            }
        }
    }

    /// Configured intro/outro file, else a rendered title card
    async fn bookend(&self, kind: CardKind, work_dir: &Path, state: &mut RunState) -> Option<PathBuf> {
        let assembly = &self.config.assembly;
        let (file, secs, name) = match kind {
            CardKind::Intro => (&assembly.intro, assembly.intro_secs, "intro"),
            _ => (&assembly.outro, assembly.outro_secs, "outro"),
        };

        if let Some(file) = file {
            if file.is_file() {
                return Some(file.clone());
            }
            state.notice(format!("{name} file {} not found, rendering a card", file.display()));
        }
        if secs <= 0.0 {
            return None;
        }

        let output = work_dir.join(format!("{name}.mp4"));
        match self.cards.render(kind, None, secs, &output).await {
            Ok(()) => Some(output),
            Err(e) => {
                state.notice(format!("{name} card skipped: {e}"));
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_captions(
        &self,
        plan: &ScenePlan,
        narration: &NarrationOutcome,
        targets: &[f64],
        closing_secs: f64,
        has_intro: bool,
        options: &RunOptions,
        state: &mut RunState,
    ) {
        let intro_secs = if has_intro { self.intro_length().await } else { 0.0 };
        let mut track = CaptionTrack::starting_at(intro_secs);
        let last = targets.len().saturating_sub(1);

        for (i, (scene, target)) in plan.scenes().iter().zip(targets).enumerate() {
            let length = if i == last { target - closing_secs } else { *target };
            if narration.speech[i].is_some() {
                track.push(scene.narration_text(), length);
            } else {
                track.skip(length);
            }
        }
        if let (Some(text), Some(_)) = (&plan.closing_text, &narration.closing) {
            track.push(text, closing_secs);
        }

        let path = options.output.with_extension("srt");
        match track.write_srt(&path).await {
            Ok(()) => {
                info!("Captions written to {}", path.display());
                state.captions_path = Some(path);
            }
            Err(e) => state.notice(format!("captions skipped: {e}")),
        }
    }

    /// Length of the intro as assembled
    async fn intro_length(&self) -> f64 {
        match &self.config.assembly.intro {
            Some(file) if file.is_file() => match self.tool.probe(file).await {
                Ok(info) => info.duration,
                Err(_) => self.config.assembly.intro_secs,
            },
            _ => self.config.assembly.intro_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_serialize_in_screaming_case() {
        let json = serde_json::to_string(&[Stage::Planned, Stage::AcquiringAudio, Stage::Done]).unwrap();
        assert_eq!(json, r#"["PLANNED","ACQUIRING_AUDIO","DONE"]"#);
        assert_eq!(Stage::AcquiringVisuals.to_string(), "ACQUIRING_VISUALS");
    }

    #[test]
    fn output_name_is_timestamped_mp4() {
        let name = default_output_name();
        assert!(name.starts_with("scenecast_"));
        assert!(name.ends_with(".mp4"));
        assert_eq!(name.len(), "scenecast_20260101_120000.mp4".len());
    }
}
