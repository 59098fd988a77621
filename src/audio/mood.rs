//! Keyword-lexicon mood classification for background music selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mood categories with a matching music bed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Upbeat,
    Emotional,
    Quirky,
    Dramatic,
    Neutral,
}

impl Mood {
    pub const ALL: [Mood; 5] = [Self::Upbeat, Self::Emotional, Self::Quirky, Self::Dramatic, Self::Neutral];

    /// Tie-break order, strongest first
    pub const PRIORITY: [Mood; 4] = [Self::Quirky, Self::Emotional, Self::Upbeat, Self::Dramatic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upbeat => "upbeat",
            Self::Emotional => "emotional",
            Self::Quirky => "quirky",
            Self::Dramatic => "dramatic",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown mood: {s}"))
    }
}

/// Classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodProfile {
    pub mood: Mood,
    /// Weighted keyword hits for the winning mood
    pub score: u32,
}

/// Keyword with its weight
pub type Keyword = (&'static str, u32);

const UPBEAT: &[Keyword] = &[
    ("happy", 1),
    ("celebration", 1),
    ("win", 1),
    ("success", 1),
    ("joy", 1),
    ("楽しい", 1),
    ("嬉しい", 1),
    ("成功", 1),
    ("優勝", 1),
];

const EMOTIONAL: &[Keyword] = &[
    ("reunite", 1),
    ("rescue", 1),
    ("save", 1),
    ("love", 1),
    ("family", 1),
    ("感動", 1),
    ("再会", 1),
    ("救出", 1),
    ("愛", 1),
    ("家族", 1),
    ("帰還", 1),
];

const QUIRKY: &[Keyword] = &[
    ("weird", 1),
    ("strange", 1),
    ("bizarre", 1),
    ("funny", 1),
    ("odd", 1),
    ("おもしろ", 1),
    ("奇妙", 1),
    ("変", 1),
    ("珍しい", 1),
    ("ユニーク", 1),
];

const DRAMATIC: &[Keyword] = &[
    ("shock", 1),
    ("amazing", 1),
    ("incredible", 1),
    ("record", 2),
    ("first", 1),
    ("驚き", 1),
    ("衝撃", 1),
    ("史上初", 2),
    ("記録", 1),
];

/// Pure, deterministic text → mood scorer
#[derive(Debug, Clone)]
pub struct MoodClassifier {
    lexicon: Vec<(Mood, Vec<Keyword>)>,
}

impl Default for MoodClassifier {
    fn default() -> Self {
        Self {
            lexicon: vec![
                (Mood::Upbeat, UPBEAT.to_vec()),
                (Mood::Emotional, EMOTIONAL.to_vec()),
                (Mood::Quirky, QUIRKY.to_vec()),
                (Mood::Dramatic, DRAMATIC.to_vec()),
            ],
        }
    }
}

impl MoodClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace or add keywords for one mood
    #[must_use]
    pub fn with_keywords(mut self, mood: Mood, keywords: Vec<Keyword>) -> Self {
        match self.lexicon.iter_mut().find(|(m, _)| *m == mood) {
            Some((_, existing)) => *existing = keywords,
            None => self.lexicon.push((mood, keywords)),
        }
        self
    }

    /// Weighted hits for `mood` in already-lowercased text.
    /// Each keyword counts once, by presence.
    fn score(&self, mood: Mood, text: &str) -> u32 {
        self.lexicon
            .iter()
            .filter(|(m, _)| *m == mood)
            .flat_map(|(_, words)| words.iter())
            .filter(|(word, _)| text.contains(word))
            .map(|(_, weight)| weight)
            .sum()
    }

    /// Classify a story from its headline and full narration
    pub fn classify(&self, headline: &str, narration: &str) -> MoodProfile {
        let text = format!("{headline} {narration}").to_lowercase();

        let mut best = MoodProfile {
            mood: Mood::Neutral,
            score: 0,
        };
        // Strictly-greater keeps the earlier (higher priority) mood on ties
        for mood in Mood::PRIORITY {
            let score = self.score(mood, &text);
            if score > best.score {
                best = MoodProfile { mood, score };
            }
        }
        best
    }
}
