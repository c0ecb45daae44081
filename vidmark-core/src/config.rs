use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Every tunable of the watermark pipeline. All sections fall back to the
/// built-in defaults when omitted from the TOML file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WatermarkConfig {
    pub paths: PathsSection,
    pub assets: AssetsSection,
    pub image: ImageSection,
    pub text: TextSection,
    pub transcode: TranscodeSection,
    pub probe: ProbeSection,
    pub replies: RepliesSection,
}

impl WatermarkConfig {
    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.work_dir)
    }

    pub fn default_image_path(&self) -> PathBuf {
        self.work_dir().join(&self.paths.default_image_name)
    }

    pub fn validate(&self) -> Result<()> {
        check_factor("image.scale_factor", self.image.scale_factor)?;
        check_factor("text.font_scale_factor", self.text.font_scale_factor)?;
        check_opacity("image.opacity", self.image.opacity)?;
        check_opacity("text.opacity", self.text.opacity)?;
        if self.probe.fallback_width == 0 || self.probe.fallback_height == 0 {
            return Err(ConfigError::Invalid {
                field: "probe.fallback_width",
                reason: "fallback dimensions must be non-zero".into(),
            });
        }
        if self.transcode.crf > 51 {
            return Err(ConfigError::Invalid {
                field: "transcode.crf",
                reason: format!("{} is outside 0..=51", self.transcode.crf),
            });
        }
        check_timeout("transcode.timeout_seconds", self.transcode.timeout_seconds)?;
        check_timeout("probe.timeout_seconds", self.probe.timeout_seconds)?;
        check_timeout("assets.fetch_timeout_seconds", self.assets.fetch_timeout_seconds)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn check_factor(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} must be a positive finite number"),
        })
    }
}

fn check_timeout(field: &'static str, seconds: u64) -> Result<()> {
    if seconds == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "timeout must be at least one second".into(),
        });
    }
    Ok(())
}

fn check_opacity(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside 0.0..=1.0"),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsSection {
    pub work_dir: String,
    pub default_image_name: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            work_dir: "./downloads".into(),
            default_image_name: "default_watermark_image.png".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetsSection {
    /// Source of the default image mark. Empty disables the image stage.
    pub image_url: String,
    pub text: String,
    pub fetch_timeout_seconds: u64,
}

impl AssetsSection {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            image_url: "https://i.ibb.co/xW7NS5d/image.jpg".into(),
            text: "join @mnbots in telegram".into(),
            fetch_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageSection {
    pub scale_factor: f64,
    pub min_width: u32,
    pub opacity: f64,
    pub offset_x: u32,
    pub offset_y: u32,
    pub pixel_format: String,
}

impl Default for ImageSection {
    fn default() -> Self {
        Self {
            scale_factor: 0.10,
            min_width: 50,
            opacity: 0.7,
            offset_x: 10,
            offset_y: 10,
            pixel_format: "rgba".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TextSection {
    pub color: String,
    pub opacity: f64,
    pub font_scale_factor: f64,
    pub min_font_size: u32,
    pub bottom_margin: u32,
    /// Probed in order; the first existing file becomes the drawtext font.
    pub font_candidates: Vec<String>,
}

impl Default for TextSection {
    fn default() -> Self {
        Self {
            color: "white".into(),
            opacity: 0.8,
            font_scale_factor: 0.03,
            min_font_size: 18,
            bottom_margin: 10,
            font_candidates: vec![
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".into(),
                "/usr/share/fonts/dejavu/DejaVuSans.ttf".into(),
                "/usr/share/fonts/TTF/DejaVuSans.ttf".into(),
                "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf".into(),
                "/System/Library/Fonts/Supplemental/Arial.ttf".into(),
                "/Library/Fonts/Arial.ttf".into(),
                "C:/Windows/Fonts/arial.ttf".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranscodeSection {
    pub ffmpeg: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub crf: u8,
    pub pix_fmt: String,
    pub faststart: bool,
    pub log_level: String,
    pub timeout_seconds: u64,
    /// Container tag templates; `{name}` expands to the input base name.
    pub metadata_title: String,
    pub metadata_comment: String,
}

impl TranscodeSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for TranscodeSection {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            video_codec: "libx264".into(),
            audio_codec: "copy".into(),
            preset: "medium".into(),
            crf: 26,
            pix_fmt: "yuv420p".into(),
            faststart: true,
            log_level: "error".into(),
            timeout_seconds: 1800,
            metadata_title: String::new(),
            metadata_comment: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeSection {
    pub ffprobe: String,
    pub timeout_seconds: u64,
    pub fallback_width: u32,
    pub fallback_height: u32,
}

impl ProbeSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            ffprobe: "ffprobe".into(),
            timeout_seconds: 20,
            fallback_width: 720,
            fallback_height: 480,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepliesSection {
    /// `{text}` expands to the watermark text, `{name}` to the input base name.
    pub caption_template: String,
    pub unsupported_message: String,
    pub max_diagnostic_chars: usize,
}

impl Default for RepliesSection {
    fn default() -> Self {
        Self {
            caption_template: "Watermarked by {text} - {name}".into(),
            unsupported_message: "Please send a video file to process.".into(),
            max_diagnostic_chars: 3500,
        }
    }
}

pub fn load_watermark_config<P: AsRef<Path>>(path: P) -> Result<WatermarkConfig> {
    let config: WatermarkConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_watermark_config`], but a missing file yields the defaults.
pub fn load_watermark_config_or_default<P: AsRef<Path>>(path: P) -> Result<WatermarkConfig> {
    let path = path.as_ref();
    if path.exists() {
        load_watermark_config(path)
    } else {
        Ok(WatermarkConfig::default())
    }
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
