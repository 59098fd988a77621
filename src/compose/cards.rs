//! Generated title cards: intro, outro and placeholder scenes.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::text_fit::TextBox;
use super::GraphicLayer;
use crate::config::{AssemblyConfig, OverlayConfig};
use crate::error::Result;
use crate::media::{self, FfmpegJob, MediaToolchain, VideoFormat};

/// Which card to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    /// Light card with the channel name
    Intro,
    /// Dark sign-off card
    Outro,
    /// Stand-in for a scene without usable visuals
    Placeholder,
}

impl CardKind {
    fn stem(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Outro => "outro",
            Self::Placeholder => "placeholder",
        }
    }
}

/// Renders cards in the canonical format with lavfi sources
#[derive(Clone)]
pub struct TitleCards {
    tool: Arc<dyn MediaToolchain>,
    overlay: OverlayConfig,
    assembly: AssemblyConfig,
    format: VideoFormat,
}

impl TitleCards {
    pub fn new(tool: Arc<dyn MediaToolchain>, overlay: OverlayConfig, assembly: AssemblyConfig, format: VideoFormat) -> Self {
        Self {
            tool,
            overlay,
            assembly,
            format,
        }
    }

    fn background(&self, kind: CardKind) -> String {
        match kind {
            CardKind::Intro => "white".to_string(),
            CardKind::Outro | CardKind::Placeholder => self.overlay.banner_color.clone(),
        }
    }

    /// Lay out a card; `caption` replaces the default text for placeholders
    pub fn layer(&self, kind: CardKind, caption: Option<&str>, text_dir: &Path) -> GraphicLayer {
        let (w, h) = (self.format.width, self.format.height);
        let mut layer = GraphicLayer::new(text_dir, kind.stem(), self.overlay.font_file.as_deref());
        let title_size = (f64::from(h) * 0.08).round() as u32;
        let small = (f64::from(h) * 0.035).round() as u32;
        let accent = self.overlay.accent_color.as_str();

        match kind {
            CardKind::Intro => {
                let mark = h / 6;
                layer.fill((w - mark) / 2, (h / 2).saturating_sub(mark + title_size), mark, mark, accent);
                layer.text(&self.overlay.channel_name, "(w-text_w)/2", h / 2, title_size, self.overlay.banner_color.as_str());
            }
            CardKind::Outro => {
                layer.fill(0, h / 2 + title_size * 3 / 2, w, h / 90, accent);
                layer.text(&self.assembly.outro_text, "(w-text_w)/2", h / 2 - title_size, title_size, "white");
                layer.text(&self.overlay.channel_name, "(w-text_w)/2", h / 2 + title_size * 2, small, accent);
            }
            CardKind::Placeholder => {
                let text = caption.unwrap_or(&self.overlay.channel_name);
                let fitted = TextBox::new(f64::from(w) * 0.8, small * 3 / 2, small).fit(text);
                let mut y = (h / 2).saturating_sub(fitted.height() / 2);
                for line in &fitted.lines {
                    layer.text(line, "(w-text_w)/2", y, fitted.font_size, "white");
                    y += fitted.font_size * 6 / 5;
                }
            }
        }
        layer
    }

    /// Job rendering a card of `duration` seconds with a silent track
    pub fn build_job(&self, kind: CardKind, layer: &GraphicLayer, duration: f64, output: &Path) -> FfmpegJob {
        let source = format!(
            "color=c={}:s={}:r={}:d={}",
            self.background(kind),
            self.format.size(),
            self.format.fps,
            media::secs(duration)
        );
        let chain = layer.chain();
        let video = if chain.is_empty() { source } else { format!("{source},{chain}") };

        FfmpegJob::new(format!("{} card", kind.stem()), output)
            .args(["-f".to_string(), "lavfi".to_string(), "-i".to_string(), video])
            .args(self.format.silence_input())
            .args(["-map", "0:v:0", "-map", "1:a:0"])
            .args(["-t".to_string(), media::secs(duration)])
            .args(self.format.video_args())
            .args(self.format.audio_args())
            .expect_duration(duration)
    }

    /// Render a card to `output`
    pub async fn render(&self, kind: CardKind, caption: Option<&str>, duration: f64, output: &Path) -> Result<()> {
        let text_dir = output.parent().unwrap_or_else(|| Path::new(".")).join("card_text");
        let layer = self.layer(kind, caption, &text_dir);
        layer.write_texts().await?;
        let job = self.build_job(kind, &layer, duration, output);
        media::render(self.tool.as_ref(), &job).await?;
        info!("Rendered {} card ({:.1}s)", kind.stem(), duration);
        Ok(())
    }
}
