use std::path::Path;

use anyhow::Result;

use scenecast::config::config_path;
use scenecast::{BgmCatalog, EngineConfig, FfmpegToolchain, MediaToolchain};

pub async fn cmd_check(config_path_arg: Option<&Path>) -> Result<()> {
    let config = EngineConfig::load(config_path_arg)?;
    let shown = config_path_arg.map_or_else(config_path, Path::to_path_buf);
    println!("🧪 scenecast environment check\n");
    println!("   Config: {}", shown.display());

    let tool = FfmpegToolchain::new();
    let ffmpeg_ok = tool.check_available().await;
    if ffmpeg_ok {
        println!("   ✅ ffmpeg: {}", tool.ffmpeg_path);
        println!("   ✅ ffprobe: {}", tool.ffprobe_path);
    } else {
        println!("   ❌ ffmpeg/ffprobe not usable ({}, {})", tool.ffmpeg_path, tool.ffprobe_path);
    }

    match which::which(&config.narration.command) {
        Ok(path) => println!("   ✅ TTS: {}", path.display()),
        Err(_) => println!("   ❌ TTS command '{}' not found", config.narration.command),
    }

    if config.premium.enabled {
        let key_set = std::env::var(&config.premium.api_key_env).is_ok();
        let mark = if key_set && !config.premium.endpoint.is_empty() { "✅" } else { "⚠️ " };
        println!("   {mark} Premium video: {} (key in {})", config.premium.endpoint, config.premium.api_key_env);
    } else {
        println!("   ➖ Premium video disabled");
    }

    let bgm = BgmCatalog::scan(&tool, &config.audio.bgm_dir).await;
    println!("   🎵 Music beds: {} in {}", bgm.len(), config.audio.bgm_dir.display());

    if !ffmpeg_ok {
        anyhow::bail!("ffmpeg is required");
    }
    Ok(())
}
