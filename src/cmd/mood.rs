use std::path::Path;

use anyhow::Result;

use scenecast::{Mood, MoodClassifier, ScenePlan};

pub async fn cmd_mood(headline: &str, text: Option<&str>, plan: Option<&Path>) -> Result<()> {
    let narration = match (text, plan) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => ScenePlan::load(path).await?.full_narration(),
        (None, None) => String::new(),
    };

    let profile = MoodClassifier::new().classify(headline, &narration);
    println!("🎵 Mood: {} (score {})", profile.mood, profile.score);
    if profile.mood == Mood::Neutral {
        println!("   No mood keywords found");
    }
    Ok(())
}
