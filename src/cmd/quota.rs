use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use scenecast::{EngineConfig, QuotaState, QuotaTracker};

#[derive(Serialize)]
struct ProviderUsage {
    provider: String,
    #[serde(flatten)]
    state: QuotaState,
}

pub async fn cmd_quota(config_path: Option<&Path>, provider: Option<&str>, json: bool) -> Result<()> {
    let config = EngineConfig::load(config_path)?;
    let budgets = [
        (&config.narration.provider_id, config.narration.monthly_char_limit, "chars"),
        (&config.premium.provider_id, config.premium.monthly_clip_limit, "clips"),
    ];

    let mut usage = Vec::new();
    for (id, limit, unit) in budgets {
        if provider.is_some_and(|p| p != id.as_str()) {
            continue;
        }
        let tracker = QuotaTracker::open(&config.paths.quota_dir, id, limit).await?;
        let entry = ProviderUsage {
            provider: id.clone(),
            state: tracker.status().await?,
        };
        usage.push((entry, unit));
    }

    if usage.is_empty() {
        anyhow::bail!("unknown provider: {}", provider.unwrap_or_default());
    }

    if json {
        let states: Vec<&ProviderUsage> = usage.iter().map(|(u, _)| u).collect();
        println!("{}", serde_json::to_string_pretty(&states)?);
        return Ok(());
    }

    println!("📊 Quota usage ({})", config.paths.quota_dir.display());
    for (entry, unit) in &usage {
        let s = &entry.state;
        let percent = if s.limit == 0 { 100.0 } else { s.used as f64 / s.limit as f64 * 100.0 };
        println!(
            "\n   {} [{}]: {}/{} {unit} ({percent:.0}%), {} remaining",
            entry.provider,
            s.period_key,
            s.used,
            s.limit,
            s.remaining()
        );
        for record in s.history.iter().rev().take(5) {
            println!(
                "      {}  {:>6}  {}",
                record.timestamp.format("%Y-%m-%d %H:%M"),
                record.amount,
                record.label
            );
        }
    }
    Ok(())
}
