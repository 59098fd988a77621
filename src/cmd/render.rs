use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use scenecast::pipeline::default_output_name;
use scenecast::{EngineConfig, PipelineOrchestrator, RunOptions, ScenePlan};

pub async fn cmd_render(
    config_path: Option<&Path>,
    plan_path: &Path,
    output: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    no_premium: bool,
    breaking: bool,
    json: bool,
) -> Result<()> {
    let mut config = EngineConfig::load(config_path)?;
    if let Some(dir) = work_dir {
        config.paths.work_dir = dir;
    }

    let plan = ScenePlan::load(plan_path)
        .await
        .with_context(|| format!("failed to load plan {}", plan_path.display()))?;
    let output = output.unwrap_or_else(|| config.paths.output_dir.join(default_output_name()));

    eprintln!("🎬 Rendering: {}", plan_path.display());
    if !plan.headline.is_empty() {
        eprintln!("   Headline: {}", plan.headline);
    }
    eprintln!("   Scenes: {}", plan.len());
    if no_premium {
        eprintln!("   Visuals: local animation only");
    }

    let pipeline = PipelineOrchestrator::from_config(config, !no_premium).await?;
    let result = pipeline
        .run(
            plan,
            &RunOptions {
                output,
                is_breaking: breaking,
            },
        )
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for scene in &result.per_scene_results {
            let mark = if scene.degraded.is_empty() { "✅" } else { "⚠️ " };
            eprintln!(
                "   {mark} Scene {}: {} clip, {:.2}s{}",
                scene.index + 1,
                scene.provider,
                scene.target_duration,
                if scene.composed { "" } else { ", no overlay" }
            );
            for reason in &scene.degraded {
                eprintln!("      - {reason}");
            }
        }
        if let Some(mood) = &result.mood {
            eprintln!("   🎵 Mood: {} (score {})", mood.mood, mood.score);
        }
        for notice in &result.notices {
            eprintln!("   ⚠️  {notice}");
        }
    }

    match (&result.final_video_path, &result.error) {
        (Some(path), _) if result.success => {
            eprintln!("💾 Saved {} ({:.1}s)", path.display(), result.total_duration);
            if let Some(captions) = &result.captions_path {
                eprintln!("📝 Captions: {}", captions.display());
            }
            Ok(())
        }
        (_, error) => anyhow::bail!("render failed: {}", error.as_deref().unwrap_or("unknown error")),
    }
}
