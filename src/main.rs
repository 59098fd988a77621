//! `scenecast` CLI - render scene plans into finished videos

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "scenecast")]
#[command(about = "Scene synchronization and composition engine for narrated news videos")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/scenecast/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scene plan (JSON) into a video
    Render {
        /// Scene plan file
        plan: PathBuf,

        /// Output video path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Working directory for intermediate files
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Use only the local animator for visuals
        #[arg(long)]
        no_premium: bool,

        /// Show the BREAKING label on the headline banner
        #[arg(long)]
        breaking: bool,

        /// Print the run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show quota usage for this billing period
    Quota {
        /// Only this provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify the mood of a headline and narration
    Mood {
        /// Headline text
        headline: String,

        /// Narration text
        text: Option<String>,

        /// Take headline and narration from a scene plan instead
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Check that ffmpeg, ffprobe and the TTS command are usable
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Render {
            plan,
            output,
            work_dir,
            no_premium,
            breaking,
            json,
        } => {
            cmd::render::cmd_render(config, &plan, output, work_dir, no_premium, breaking, json).await?;
        }
        Commands::Quota { provider, json } => {
            cmd::quota::cmd_quota(config, provider.as_deref(), json).await?;
        }
        Commands::Mood { headline, text, plan } => {
            cmd::mood::cmd_mood(&headline, text.as_deref(), plan.as_deref()).await?;
        }
        Commands::Check => {
            cmd::check::cmd_check(config).await?;
        }
    }

    Ok(())
}
