//! Graphics: overlay compositing, text fitting and title cards
//!
//! All text reaches ffmpeg through `drawtext=textfile=...`, so headlines
//! never need filter-level escaping.

pub mod cards;
pub mod overlay;
pub mod text_fit;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::media::escape_filter_path;

pub use cards::{CardKind, TitleCards};
pub use overlay::{OverlayCompositor, SceneOverlay};
pub use text_fit::{FittedText, TextBox};

/// Accumulates drawbox/drawtext filters for one graphic layer
#[derive(Debug, Clone)]
pub struct GraphicLayer {
    text_dir: PathBuf,
    stem: String,
    font: Option<PathBuf>,
    filters: Vec<String>,
    texts: Vec<(PathBuf, String)>,
}

impl GraphicLayer {
    /// Text files are written to `text_dir` as `<stem>_t<n>.txt`
    pub fn new(text_dir: &Path, stem: &str, font: Option<&Path>) -> Self {
        Self {
            text_dir: text_dir.to_path_buf(),
            stem: stem.to_string(),
            font: font.map(Path::to_path_buf),
            filters: Vec::new(),
            texts: Vec::new(),
        }
    }

    /// Filled rectangle
    pub fn fill(&mut self, x: u32, y: u32, w: u32, h: u32, color: &str) {
        self.filters
            .push(format!("drawbox=x={x}:y={y}:w={w}:h={h}:color={color}:t=fill"));
    }

    /// One line of text; `x` may be an expression such as `(w-text_w)/2`
    pub fn text(&mut self, content: &str, x: &str, y: u32, size: u32, color: &str) {
        let path = self
            .text_dir
            .join(format!("{}_t{}.txt", self.stem, self.texts.len()));
        let mut filter = format!(
            "drawtext=textfile='{}':expansion=none:fontsize={size}:fontcolor={color}:x={x}:y={y}",
            escape_filter_path(&path)
        );
        if let Some(font) = &self.font {
            filter.push_str(&format!(":fontfile='{}'", escape_filter_path(font)));
        }
        self.filters.push(filter);
        self.texts.push((path, content.to_string()));
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// Text contents in drawing order
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.texts.iter().map(|(_, t)| t.as_str())
    }

    /// Comma-joined chain, empty when nothing was drawn
    pub fn chain(&self) -> String {
        self.filters.join(",")
    }

    /// Write the text files the filters reference
    pub async fn write_texts(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.text_dir).await?;
        for (path, content) in &self.texts {
            tokio::fs::write(path, content).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_builds_filters_in_order() {
        let mut layer = GraphicLayer::new(Path::new("/w/text"), "s0", Some(Path::new("/fonts/Noto.ttf")));
        layer.fill(10, 20, 300, 40, "0xe94560@0.9");
        layer.text("BREAKING", "24", 28, 32, "white");

        assert_eq!(layer.filters()[0], "drawbox=x=10:y=20:w=300:h=40:color=0xe94560@0.9:t=fill");
        assert!(layer.filters()[1].starts_with("drawtext=textfile='/w/text/s0_t0.txt':expansion=none"));
        assert!(layer.filters()[1].ends_with(":fontfile='/fonts/Noto.ttf'"));
        assert_eq!(layer.texts().collect::<Vec<_>>(), vec!["BREAKING"]);
    }

    #[tokio::test]
    async fn texts_are_written_verbatim() {
        let dir = std::env::temp_dir().join(format!("scenecast-layer-{}", uuid::Uuid::new_v4()));
        let mut layer = GraphicLayer::new(&dir, "card", None);
        layer.text("it's 100%: done", "0", 0, 10, "white");
        layer.write_texts().await.unwrap();

        let written = std::fs::read_to_string(dir.join("card_t0.txt")).unwrap();
        assert_eq!(written, "it's 100%: done");
        std::fs::remove_dir_all(&dir).ok();
    }
}
