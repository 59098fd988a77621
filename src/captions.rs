//! SubRip caption sidecar for the assembled video.

use serde::Serialize;
use std::fmt::Write as FmtWrite;
use std::path::Path;

use crate::error::Result;

/// One caption with absolute timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptionCue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Format time as SRT timestamp (HH:MM:SS,mmm)
pub fn format_srt_time(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

fn to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

/// Cues laid end to end on the output timeline
#[derive(Debug, Clone, Default)]
pub struct CaptionTrack {
    cursor_ms: u64,
    cues: Vec<CaptionCue>,
}

impl CaptionTrack {
    /// Start the timeline at `offset` seconds (the intro length)
    pub fn starting_at(offset: f64) -> Self {
        Self {
            cursor_ms: to_ms(offset),
            cues: Vec::new(),
        }
    }

    /// Caption `text` for the next `duration` seconds. Blank text only advances.
    pub fn push(&mut self, text: &str, duration: f64) {
        let start = self.cursor_ms;
        self.cursor_ms += to_ms(duration);
        let text = text.trim();
        if !text.is_empty() && self.cursor_ms > start {
            self.cues.push(CaptionCue {
                start_ms: start,
                end_ms: self.cursor_ms,
                text: text.to_string(),
            });
        }
    }

    /// Advance without a caption
    pub fn skip(&mut self, duration: f64) {
        self.cursor_ms += to_ms(duration);
    }

    pub fn cues(&self) -> &[CaptionCue] {
        &self.cues
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn to_srt(&self) -> String {
        let mut output = String::new();
        for (i, cue) in self.cues.iter().enumerate() {
            // Writing to a String cannot fail
            let _ = writeln!(output, "{}", i + 1);
            let _ = writeln!(
                output,
                "{} --> {}",
                format_srt_time(cue.start_ms),
                format_srt_time(cue.end_ms)
            );
            let _ = writeln!(output, "{}", cue.text);
            let _ = writeln!(output);
        }
        output
    }

    pub async fn write_srt(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.to_srt()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srt_time_format() {
        assert_eq!(format_srt_time(0), "00:00:00,000");
        assert_eq!(format_srt_time(61_000), "00:01:01,000");
        assert_eq!(format_srt_time(3_661_500), "01:01:01,500");
    }

    #[test]
    fn cues_are_offset_by_intro() {
        let mut track = CaptionTrack::starting_at(2.0);
        track.push("First scene.", 4.0);
        track.skip(1.5);
        track.push("Second scene.", 6.25);

        let cues = track.cues();
        assert_eq!(cues.len(), 2);
        assert_eq!((cues[0].start_ms, cues[0].end_ms), (2_000, 6_000));
        assert_eq!((cues[1].start_ms, cues[1].end_ms), (7_500, 13_750));
    }

    #[test]
    fn blank_text_only_advances() {
        let mut track = CaptionTrack::default();
        track.push("  ", 3.0);
        track.push("Later.", 1.0);
        assert_eq!(track.cues()[0].start_ms, 3_000);
    }

    #[test]
    fn test_srt_generation() {
        let mut track = CaptionTrack::default();
        track.push("Hello", 1.5);
        track.push("World", 2.0);
        let srt = track.to_srt();
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,500\nHello\n\n"));
        assert!(srt.contains("2\n00:00:01,500 --> 00:00:03,500\nWorld\n"));
    }

    #[tokio::test]
    async fn writes_sidecar() {
        let path = std::env::temp_dir().join(format!("scenecast-{}.srt", uuid::Uuid::new_v4()));
        let mut track = CaptionTrack::default();
        track.push("Only cue", 2.0);
        track.write_srt(&path).await.unwrap();
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.contains("Only cue"));
        tokio::fs::remove_file(path).await.ok();
    }
}
