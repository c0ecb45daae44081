use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::WatermarkConfig;

/// Frame size the filter graph is computed from. Both sides are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedDimensions {
    width: u32,
    height: u32,
}

impl ResolvedDimensions {
    /// Used when neither the transport nor the probe knows the frame size.
    pub const FALLBACK: Self = Self {
        width: 720,
        height: 480,
    };

    pub const fn new(width: u32, height: u32) -> Option<Self> {
        if width > 0 && height > 0 {
            Some(Self { width, height })
        } else {
            None
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Display for ResolvedDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Values attached to the video reply. All-zero means "unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMetadata {
    pub duration_seconds: u64,
    pub width: u32,
    pub height: u32,
}

/// The marks applied to every job.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkAssets {
    pub image_path: Option<PathBuf>,
    pub text: String,
    pub text_opacity: f64,
    pub image_opacity: f64,
    pub font_path: Option<PathBuf>,
}

impl WatermarkAssets {
    pub fn from_config(
        config: &WatermarkConfig,
        image_path: Option<PathBuf>,
        font_path: Option<PathBuf>,
    ) -> Self {
        Self {
            image_path,
            text: config.assets.text.clone(),
            text_opacity: config.text.opacity,
            image_opacity: config.image.opacity,
            font_path,
        }
    }
}
