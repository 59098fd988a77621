//! Local fallback: animate a still image with pan/zoom presets.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::media::{self, FfmpegJob, MediaToolchain, VideoFormat};

/// Camera move applied to a still
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionPreset {
    ZoomIn,
    ZoomOut,
    KenBurns,
    PanLeft,
    PanRight,
    Dynamic,
}

impl MotionPreset {
    pub const ALL: [MotionPreset; 6] = [
        Self::ZoomIn,
        Self::ZoomOut,
        Self::KenBurns,
        Self::PanLeft,
        Self::PanRight,
        Self::Dynamic,
    ];

    /// Preset used for the scene at `index`; cycles so neighbours differ
    pub fn for_scene(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ZoomIn => "zoom_in",
            Self::ZoomOut => "zoom_out",
            Self::KenBurns => "ken_burns",
            Self::PanLeft => "pan_left",
            Self::PanRight => "pan_right",
            Self::Dynamic => "dynamic",
        }
    }

    /// `zoompan` expressions (z, x, y) for a clip of `frames` frames
    fn zoompan(self, frames: u32) -> (String, String, String) {
        let center_x = "iw/2-(iw/zoom/2)".to_string();
        let center_y = "ih/2-(ih/zoom/2)".to_string();
        match self {
            Self::ZoomIn => ("min(zoom+0.0010,1.3)".into(), center_x, center_y),
            Self::ZoomOut => ("if(eq(on,0),1.3,max(zoom-0.0010,1.0))".into(), center_x, center_y),
            Self::KenBurns => (
                "min(zoom+0.0015,1.3)".into(),
                "if(gte(zoom,1.3),x,x+1)".into(),
                center_y,
            ),
            Self::PanLeft => ("1.1".into(), format!("(iw-iw/zoom)*(1-on/{frames})"), center_y),
            Self::PanRight => ("1.1".into(), format!("(iw-iw/zoom)*on/{frames}"), center_y),
            Self::Dynamic => ("min(zoom+0.002,1.5)".into(), center_x, center_y),
        }
    }

    /// Color/sharpness pass following the camera move
    fn enhance(self) -> Option<&'static str> {
        match self {
            Self::KenBurns => Some("eq=contrast=1.1:saturation=1.2,unsharp=3:3:1.0:3:3:0.5"),
            Self::Dynamic => Some("eq=contrast=1.2:saturation=1.3:brightness=0.02,unsharp=5:5:1.5:5:5:0.5"),
            _ => None,
        }
    }
}

impl std::fmt::Display for MotionPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns a still into a clip locally. Never consumes quota.
#[derive(Clone)]
pub struct DeterministicAnimator {
    tool: Arc<dyn MediaToolchain>,
    format: VideoFormat,
    max_clip_secs: f64,
}

impl DeterministicAnimator {
    pub fn new(tool: Arc<dyn MediaToolchain>, format: VideoFormat, max_clip_secs: f64) -> Self {
        Self {
            tool,
            format,
            max_clip_secs,
        }
    }

    /// Clip length for a requested hint, at least one second
    pub fn clip_duration(&self, hint: f64) -> f64 {
        let hint = if hint.is_finite() { hint } else { 1.0 };
        hint.min(self.max_clip_secs).max(1.0)
    }

    /// Filter chain: cover the frame, move the camera, optionally enhance
    pub fn filter(&self, preset: MotionPreset, duration: f64) -> String {
        let (w, h, fps) = (self.format.width, self.format.height, self.format.fps);
        let frames = (duration * f64::from(fps)).ceil().max(1.0) as u32;
        let (z, x, y) = preset.zoompan(frames);
        let mut chain = format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},\
             zoompan=z='{z}':x='{x}':y='{y}':d={frames}:s={w}x{h}:fps={fps}"
        );
        if let Some(enhance) = preset.enhance() {
            chain.push(',');
            chain.push_str(enhance);
        }
        chain.push_str(",setsar=1,format=yuv420p");
        chain
    }

    pub fn build_job(&self, still: &Path, preset: MotionPreset, duration: f64, output: &Path) -> FfmpegJob {
        FfmpegJob::new(format!("animate {preset}"), output)
            .input(still)
            .args(["-filter:v".to_string(), self.filter(preset, duration)])
            .args(["-t".to_string(), media::secs(duration)])
            .arg("-an")
            .args(self.format.video_args())
            .expect_duration(duration)
    }

    /// Animate `still` for the scene at `index`. Returns the clip length.
    pub async fn animate(&self, still: &Path, index: usize, hint: f64, output: &Path) -> Result<f64> {
        let preset = MotionPreset::for_scene(index);
        let duration = self.clip_duration(hint);
        let job = self.build_job(still, preset, duration, output);
        let info = media::render(self.tool.as_ref(), &job).await?;
        info!("Animated scene {} with {} ({:.1}s)", index + 1, preset, info.duration);
        Ok(info.duration)
    }
}
