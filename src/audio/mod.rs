//! Audio side of the engine
//!
//! - [`MoodClassifier`]: picks a mood from the story text
//! - [`BgmCatalog`]: music beds per mood
//! - [`AudioMixer`]: narration track and music mix

pub mod bgm;
pub mod mixer;
pub mod mood;

pub use bgm::{BgmCatalog, BgmTrack};
pub use mixer::{AudioMixer, MixedAudio, NarrationSegment};
pub use mood::{Mood, MoodClassifier, MoodProfile};
