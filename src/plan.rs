//! Scene plans: the upstream payload and its validated form.
//!
//! The planner hands over loosely-shaped JSON ([`ScenePlanPayload`]). It is
//! checked once by [`ScenePlan::from_payload`]; everything downstream works
//! with typed [`Scene`]s whose index and narration are guaranteed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Scene plan as produced by the upstream script writer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenePlanPayload {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub sub_headline: String,
    /// Sign-off narration spoken after the last scene
    #[serde(default)]
    pub closing_text: String,
    pub scenes: Vec<ScenePayload>,
    #[serde(default)]
    pub hook: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub visual_style: Option<String>,
}

/// One scene in the upstream payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenePayload {
    #[serde(default)]
    pub narration: String,
    #[serde(default)]
    pub visual_description: String,
    #[serde(default)]
    pub emphasis_word: Option<String>,
    /// Pre-generated still for this scene
    #[serde(default)]
    pub image: Option<PathBuf>,
}

/// A validated scene. Identity fields are fixed at ingestion; the derived
/// fields are filled in as the run progresses.
#[derive(Debug, Clone, Serialize)]
pub struct Scene {
    index: usize,
    narration_text: String,
    visual_intent: String,
    emphasis_word: Option<String>,
    still: Option<PathBuf>,
    /// Measured narration length (seconds)
    pub narration_duration: Option<f64>,
    /// Raw clip from the visual provider
    pub clip_path: Option<PathBuf>,
    /// Reconciled and overlaid clip ready for assembly
    pub composed_path: Option<PathBuf>,
}

impl Scene {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn narration_text(&self) -> &str {
        &self.narration_text
    }

    pub fn visual_intent(&self) -> &str {
        &self.visual_intent
    }

    pub fn emphasis_word(&self) -> Option<&str> {
        self.emphasis_word.as_deref()
    }

    /// Still image supplied with the plan, if any
    pub fn still(&self) -> Option<&Path> {
        self.still.as_deref()
    }
}

/// Validated, non-empty ordered list of scenes plus the plan-level text
#[derive(Debug, Clone, Serialize)]
pub struct ScenePlan {
    pub headline: String,
    pub sub_headline: String,
    pub closing_text: Option<String>,
    pub hook: Option<String>,
    pub keywords: Vec<String>,
    pub visual_style: Option<String>,
    scenes: Vec<Scene>,
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl ScenePlan {
    /// Validate an upstream payload
    pub fn from_payload(payload: ScenePlanPayload) -> Result<Self> {
        if payload.scenes.is_empty() {
            return Err(EngineError::InvalidPlan("plan has no scenes".to_string()));
        }

        let scenes = payload
            .scenes
            .into_iter()
            .enumerate()
            .map(|(index, s)| {
                let narration_text = non_empty(&s.narration).ok_or_else(|| {
                    EngineError::InvalidPlan(format!("scene {} has empty narration", index + 1))
                })?;
                Ok(Scene {
                    index,
                    narration_text,
                    visual_intent: s.visual_description.trim().to_string(),
                    emphasis_word: s.emphasis_word.as_deref().and_then(non_empty),
                    still: s.image,
                    narration_duration: None,
                    clip_path: None,
                    composed_path: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            headline: payload.headline.trim().to_string(),
            sub_headline: payload.sub_headline.trim().to_string(),
            closing_text: non_empty(&payload.closing_text),
            hook: payload.hook.as_deref().and_then(non_empty),
            keywords: payload.keywords,
            visual_style: payload.visual_style.as_deref().and_then(non_empty),
            scenes,
        })
    }

    /// Parse and validate a JSON plan
    pub fn from_json(json: &str) -> Result<Self> {
        let payload: ScenePlanPayload = serde_json::from_str(json)?;
        Self::from_payload(payload)
    }

    /// Read a JSON plan from disk. Relative `image` paths resolve against
    /// the plan file's directory.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let mut payload: ScenePlanPayload = serde_json::from_str(&raw)?;
        if let Some(base) = path.parent() {
            for scene in &mut payload.scenes {
                if let Some(image) = scene.image.as_mut() {
                    if image.is_relative() {
                        *image = base.join(&*image);
                    }
                }
            }
        }
        Self::from_payload(payload)
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn scenes_mut(&mut self) -> &mut [Scene] {
        &mut self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    /// Always false for a validated plan
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// All spoken text, in order, for mood scoring
    pub fn full_narration(&self) -> String {
        let mut parts: Vec<&str> = self.scenes.iter().map(|s| s.narration_text.as_str()).collect();
        if let Some(closing) = &self.closing_text {
            parts.push(closing);
        }
        parts.join(" ")
    }
}
