//! `scenecast` - Scene synchronization and composition engine
//!
//! Turns a scene plan (narration text plus visual intent per scene) into one
//! finished video: narration is synthesized, each scene gets a clip from a
//! premium generator or a local animated still, clips are retimed to their
//! narration, overlays are burned in, music is mixed under the voice and the
//! whole thing is assembled between an intro and an outro.
//!
//! # Features
//!
//! - **Quota safety**: per-provider monthly budgets persisted with atomic
//!   read-modify-write, plus minimum call spacing
//! - **Graceful degradation**: premium failures fall back per scene; overlay,
//!   music and caption problems never abort a run
//! - **Duration invariants**: every scene clip plays for its target length
//!
//! # Example
//!
//! ```rust,no_run
//! use scenecast::{EngineConfig, PipelineOrchestrator, RunOptions, ScenePlan};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let plan = ScenePlan::load("plan.json".as_ref()).await?;
//!     let pipeline = PipelineOrchestrator::from_config(EngineConfig::load(None)?, true).await?;
//!     let options = RunOptions { output: "out.mp4".into(), is_breaking: false };
//!     let result = pipeline.run(plan, &options).await;
//!     println!("success: {}", result.success);
//!     Ok(())
//! }
//! ```

pub mod assemble;
pub mod audio;
pub mod captions;
pub mod compose;
pub mod config;
pub mod error;
pub mod media;
pub mod narration;
pub mod pipeline;
pub mod plan;
pub mod quota;
pub mod reconcile;
pub mod visual;

pub use assemble::{Assembled, Assembler};
pub use audio::{AudioMixer, BgmCatalog, BgmTrack, MixedAudio, Mood, MoodClassifier, MoodProfile};
pub use captions::{CaptionCue, CaptionTrack};
pub use compose::{CardKind, OverlayCompositor, SceneOverlay, TitleCards};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use media::{FfmpegJob, FfmpegToolchain, MediaInfo, MediaToolchain, VideoFormat};
pub use narration::{CommandSynthesizer, Narration, NarrationSynthesizer};
pub use pipeline::{Collaborators, PipelineOrchestrator, PipelineResult, RunOptions, SceneReport, Stage};
pub use plan::{Scene, ScenePlan, ScenePlanPayload};
pub use quota::{ProviderGate, QuotaState, QuotaTracker, RateLimiter, RetryPolicy};
pub use reconcile::{DurationReconciler, ReconcilePlan};
pub use visual::{
    ClipGenerator, DeterministicAnimator, DirectoryStills, GenerationResult, HttpClipGenerator, MotionPreset, Provider,
    StillSource, VisualClipProvider,
};

/// Version of scenecast
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
