//! Background music catalog, scanned once per run.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::mood::Mood;
use crate::media::MediaToolchain;

const EXTENSIONS: [&str; 4] = ["mp3", "m4a", "wav", "ogg"];

/// One music bed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BgmTrack {
    pub mood: Mood,
    pub path: PathBuf,
    pub duration: f64,
}

/// Tracks available per mood
#[derive(Debug, Clone, Default)]
pub struct BgmCatalog {
    tracks: HashMap<Mood, BgmTrack>,
}

impl BgmCatalog {
    /// Look for `<mood>.<ext>` in `dir` and measure each file found.
    /// Unreadable tracks are skipped; a missing directory gives an empty catalog.
    pub async fn scan(tool: &dyn MediaToolchain, dir: &Path) -> Self {
        let mut tracks = HashMap::new();
        if !dir.is_dir() {
            debug!("No BGM directory at {}", dir.display());
            return Self { tracks };
        }

        for mood in Mood::ALL {
            let Some(path) = EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{mood}.{ext}")))
                .find(|p| p.is_file())
            else {
                continue;
            };

            match tool.probe(&path).await {
                Ok(info) if info.duration > 0.0 => {
                    debug!("BGM {mood}: {} ({:.1}s)", path.display(), info.duration);
                    tracks.insert(
                        mood,
                        BgmTrack {
                            mood,
                            path,
                            duration: info.duration,
                        },
                    );
                }
                Ok(_) => warn!("BGM {} has no duration, skipping", path.display()),
                Err(e) => warn!("BGM {} unreadable: {e}", path.display()),
            }
        }

        Self { tracks }
    }

    /// Build a catalog from known tracks
    pub fn from_tracks(tracks: impl IntoIterator<Item = BgmTrack>) -> Self {
        Self {
            tracks: tracks.into_iter().map(|t| (t.mood, t)).collect(),
        }
    }

    /// Track for exactly this mood
    pub fn track_for(&self, mood: Mood) -> Option<&BgmTrack> {
        self.tracks.get(&mood)
    }

    /// Track for `mood`, optionally falling back to the neutral bed
    pub fn select(&self, mood: Mood, neutral_fallback: bool) -> Option<&BgmTrack> {
        self.track_for(mood)
            .or_else(|| neutral_fallback.then(|| self.track_for(Mood::Neutral)).flatten())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
