//! Where a scene's still image comes from.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::plan::Scene;

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Prompt for a still of this scene
pub fn still_prompt(scene: &Scene, headline: &str) -> String {
    let mut prompt = format!("Photorealistic, cinematic lighting, 4K quality, {}", scene.visual_intent());
    if !headline.is_empty() {
        prompt.push_str(&format!(", related to: {headline}"));
    }
    prompt
}

/// Still-image collaborator
#[async_trait]
pub trait StillSource: Send + Sync {
    /// A usable still for `scene`, or `None` when there is none
    async fn still_for(&self, scene: &Scene, prompt: &str) -> Result<Option<PathBuf>>;
}

/// Stills supplied with the plan or found as `scene_<index>.<ext>` in a directory
#[derive(Debug, Clone, Default)]
pub struct DirectoryStills {
    dir: Option<PathBuf>,
}

impl DirectoryStills {
    pub fn new(dir: Option<&Path>) -> Self {
        Self {
            dir: dir.map(Path::to_path_buf),
        }
    }
}

#[async_trait]
impl StillSource for DirectoryStills {
    async fn still_for(&self, scene: &Scene, _prompt: &str) -> Result<Option<PathBuf>> {
        if let Some(still) = scene.still().filter(|p| p.is_file()) {
            return Ok(Some(still.to_path_buf()));
        }
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        Ok(EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("scene_{}.{ext}", scene.index())))
            .find(|p| p.is_file()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ScenePlan;

    #[tokio::test]
    async fn finds_indexed_still_in_directory() {
        let dir = std::env::temp_dir().join(format!("scenecast-stills-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("scene_1.jpg"), b"jpg").unwrap();

        let plan = ScenePlan::from_json(r#"{"scenes": [{"narration": "a"}, {"narration": "b"}]}"#).unwrap();
        let stills = DirectoryStills::new(Some(&dir));

        assert_eq!(stills.still_for(&plan.scenes()[0], "").await.unwrap(), None);
        assert_eq!(
            stills.still_for(&plan.scenes()[1], "").await.unwrap(),
            Some(dir.join("scene_1.jpg"))
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn plan_image_wins_over_directory() {
        let dir = std::env::temp_dir().join(format!("scenecast-stills-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let explicit = dir.join("harbour.png");
        std::fs::write(&explicit, b"png").unwrap();
        std::fs::write(dir.join("scene_0.png"), b"png").unwrap();

        let json = format!(r#"{{"scenes": [{{"narration": "a", "image": "{}"}}]}}"#, explicit.display());
        let plan = ScenePlan::from_json(&json).unwrap();
        let found = DirectoryStills::new(Some(&dir)).still_for(&plan.scenes()[0], "").await.unwrap();
        assert_eq!(found, Some(explicit));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn prompt_mentions_headline() {
        let plan = ScenePlan::from_json(r#"{"scenes": [{"narration": "a", "visual_description": "harbour at dawn"}]}"#).unwrap();
        let prompt = still_prompt(&plan.scenes()[0], "Ferry returns");
        assert!(prompt.contains("harbour at dawn"));
        assert!(prompt.ends_with("related to: Ferry returns"));
    }
}
