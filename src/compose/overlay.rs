//! Burns the channel mark, headline banner and scene caption onto a clip.
//!
//! The graphics are drawn on a transparent `color` source and laid over the
//! clip in a single ffmpeg pass.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::text_fit::{measure, TextBox};
use super::GraphicLayer;
use crate::config::OverlayConfig;
use crate::error::Result;
use crate::media::{self, FfmpegJob, MediaToolchain, VideoFormat};

const TEXT_COLOR: &str = "white";

/// Text shown on one scene
#[derive(Debug, Clone, Default, Serialize)]
pub struct SceneOverlay<'a> {
    pub headline: &'a str,
    pub sub_headline: &'a str,
    pub caption: &'a str,
    pub emphasis: Option<&'a str>,
    pub is_breaking: bool,
    pub scene_index: usize,
}

/// Outcome of laying out one scene's graphics
#[derive(Debug, Clone)]
pub struct OverlayLayout {
    pub layer: GraphicLayer,
    pub banner: bool,
    /// Some text had to be ellipsis-truncated
    pub truncated: bool,
}

/// Overlay renderer for scene clips
#[derive(Clone)]
pub struct OverlayCompositor {
    tool: Arc<dyn MediaToolchain>,
    config: OverlayConfig,
    format: VideoFormat,
}

impl OverlayCompositor {
    pub fn new(tool: Arc<dyn MediaToolchain>, config: OverlayConfig, format: VideoFormat) -> Self {
        Self { tool, config, format }
    }

    fn scaled(&self, fraction: f64) -> u32 {
        (f64::from(self.format.height) * fraction).round() as u32
    }

    /// Whether the headline banner appears on this scene
    pub fn shows_banner(&self, scene: &SceneOverlay<'_>) -> bool {
        !scene.headline.is_empty() && (scene.scene_index == 0 || self.config.headline_on_all_scenes)
    }

    /// Compute boxes and text positions for a scene
    pub fn layout(&self, scene: &SceneOverlay<'_>, text_dir: &Path) -> OverlayLayout {
        let c = &self.config;
        let (w, h) = (self.format.width, self.format.height);
        let margin = (f64::from(w) * 0.025).round() as u32;
        let content_w = f64::from(w.saturating_sub(2 * margin));
        let accent = format!("{}@0.92", c.accent_color);
        let mut layer = GraphicLayer::new(
            text_dir,
            &format!("scene_{}", scene.scene_index),
            c.font_file.as_deref(),
        );
        let mut truncated = false;

        // Channel mark, top left
        let mark_size = self.scaled(0.03);
        let pad = mark_size * 2 / 5;
        let mark_w = measure(&c.channel_name, mark_size).ceil() as u32 + 2 * pad;
        layer.fill(margin, margin, mark_w, mark_size + 2 * pad, &accent);
        layer.text(&c.channel_name, &(margin + pad).to_string(), margin + pad, mark_size, TEXT_COLOR);

        // Emphasis badge, top right
        if let Some(word) = scene.emphasis {
            let size = self.scaled(0.04);
            let pad = size * 2 / 5;
            let badge_w = measure(word, size).ceil() as u32 + 2 * pad;
            let x = w.saturating_sub(margin + badge_w);
            layer.fill(x, margin, badge_w, size + 2 * pad, "white@0.9");
            layer.text(word, &(x + pad).to_string(), margin + pad, size, &c.accent_color);
        }

        let banner = self.shows_banner(scene);
        let mut bottom = h;

        if banner {
            let banner_h = self.scaled(0.25);
            let top = h - banner_h;
            layer.fill(0, top, w, banner_h, &format!("{}@0.85", c.banner_color));

            if scene.is_breaking {
                let size = self.scaled(0.03);
                let pad = size * 2 / 5;
                let label = "BREAKING";
                let label_w = measure(label, size).ceil() as u32 + 2 * pad;
                let label_h = size + 2 * pad;
                layer.fill(margin, top.saturating_sub(label_h), label_w, label_h, &accent);
                layer.text(label, &(margin + pad).to_string(), top.saturating_sub(label_h) + pad, size, TEXT_COLOR);
            }

            let mut y = top + self.scaled(0.025);
            let headline = TextBox::new(content_w, self.scaled(0.045), self.scaled(0.03)).fit(scene.headline);
            truncated |= headline.truncated;
            for line in &headline.lines {
                layer.text(line, &margin.to_string(), y, headline.font_size, TEXT_COLOR);
                y += headline.font_size * 6 / 5;
            }

            if !scene.sub_headline.is_empty() {
                y += self.scaled(0.01);
                let sub = TextBox::new(content_w, self.scaled(0.028), self.scaled(0.022)).fit(scene.sub_headline);
                truncated |= sub.truncated;
                for line in &sub.lines {
                    layer.text(line, &margin.to_string(), y, sub.font_size, "0xdddddd");
                    y += sub.font_size * 6 / 5;
                }
            }
            bottom = top;
        }

        if c.captions && !scene.caption.is_empty() {
            let pad = self.scaled(0.015);
            let caption = TextBox::new(content_w - 2.0 * f64::from(pad), self.scaled(0.04), self.scaled(0.028))
                .fit(scene.caption);
            truncated |= caption.truncated;

            let box_h = caption.height() + 2 * pad;
            let box_top = bottom.saturating_sub(margin + box_h);
            layer.fill(margin, box_top, w - 2 * margin, box_h, "black@0.55");

            let mut y = box_top + pad;
            for line in &caption.lines {
                layer.text(line, "(w-text_w)/2", y, caption.font_size, TEXT_COLOR);
                y += caption.font_size * 6 / 5;
            }
        }

        OverlayLayout {
            layer,
            banner,
            truncated,
        }
    }

    /// Filter graph: transparent graphic layer over input 0
    pub fn filter_graph(&self, layout: &OverlayLayout, duration: f64) -> String {
        let source = format!(
            "color=c=black@0.0:s={}:r={}:d={},format=rgba",
            self.format.size(),
            self.format.fps,
            media::secs(duration)
        );
        let chain = layout.layer.chain();
        let graphics = if chain.is_empty() { source } else { format!("{source},{chain}") };
        format!("{graphics}[ov];[0:v][ov]overlay=0:0:shortest=1:format=auto,format=yuv420p[v]")
    }

    /// Overlay `scene` onto `clip`, writing `output`
    pub async fn compose(&self, clip: &Path, scene: &SceneOverlay<'_>, output: &Path) -> Result<OverlayLayout> {
        let duration = self.tool.probe(clip).await?.duration;
        let text_dir = output
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("overlay_text");
        let layout = self.layout(scene, &text_dir);
        layout.layer.write_texts().await?;

        let job = FfmpegJob::new(format!("overlay scene {}", scene.scene_index + 1), output)
            .input(clip)
            .args(["-filter_complex".to_string(), self.filter_graph(&layout, duration)])
            .args(["-map", "[v]", "-map", "0:a?", "-c:a", "copy"])
            .args(self.format.video_args())
            .args(["-t".to_string(), media::secs(duration)])
            .expect_duration(duration);

        debug!("Overlay scene {}: {} filters", scene.scene_index + 1, layout.layer.filters().len());
        media::render(self.tool.as_ref(), &job).await?;
        info!(
            "Composited scene {} (banner: {}, truncated: {})",
            scene.scene_index + 1,
            layout.banner,
            layout.truncated
        );
        Ok(layout)
    }
}
