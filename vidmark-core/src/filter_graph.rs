//! Filter graph for the image and text marks.
//!
//! The graph always operates on the first input's video stream. When an image
//! mark is present it is fed as the second input, scaled relative to the frame
//! width, converted to an alpha-capable format, faded and overlaid at a fixed
//! offset. The text mark is drawn last so it renders above the image. Audio is
//! never touched by the graph.

use std::path::{Path, PathBuf};

use crate::config::{ImageSection, TextSection, WatermarkConfig};
use crate::types::{ResolvedDimensions, WatermarkAssets};

/// Label of the graph's final video pad, mapped by the transcoder.
pub const VIDEO_OUTPUT_LABEL: &str = "vout";

const MAIN_INPUT: &str = "0:v";
const IMAGE_INPUT: &str = "1:v";
const IMAGE_LABEL: &str = "wm";

#[derive(Debug, Clone, PartialEq)]
pub enum FilterStage {
    /// Scales the image mark to `width`; height follows the aspect ratio.
    Scale { width: u32 },
    Format { pixel_format: String },
    /// Multiplies the alpha channel by `alpha`.
    OpacityMix { alpha: f64 },
    Overlay { x: u32, y: u32 },
    DrawText(DrawText),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawText {
    pub text: String,
    pub font_file: Option<PathBuf>,
    pub font_size: u32,
    pub color: String,
    pub opacity: f64,
    pub bottom_margin: u32,
}

impl FilterStage {
    /// Stages drawn onto the main video stream.
    pub fn is_visual(&self) -> bool {
        matches!(self, FilterStage::Overlay { .. } | FilterStage::DrawText(_))
    }

    fn render(&self) -> String {
        match self {
            FilterStage::Scale { width } => format!("scale={width}:-1"),
            FilterStage::Format { pixel_format } => format!("format={pixel_format}"),
            FilterStage::OpacityMix { alpha } => format!("colorchannelmixer=aa={alpha}"),
            FilterStage::Overlay { x, y } => format!("overlay={x}:{y}"),
            FilterStage::DrawText(draw) => draw.render(),
        }
    }
}

impl DrawText {
    fn render(&self) -> String {
        let mut options = Vec::with_capacity(7);
        if let Some(font) = &self.font_file {
            options.push(format!(
                "fontfile={}",
                escape_graph(&escape_option(&font.to_string_lossy()))
            ));
        }
        options.push(format!(
            "text={}",
            escape_graph(&escape_option(&escape_expansion(&self.text)))
        ));
        options.push(format!("fontcolor={}@{}", self.color, self.opacity));
        options.push(format!("fontsize={}", self.font_size));
        options.push("x=(w-text_w)/2".to_string());
        options.push(format!("y=h-text_h-{}", self.bottom_margin));
        format!("drawtext={}", options.join(":"))
    }
}

/// Ordered, immutable description of the watermark filters for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraphSpec {
    image_input: Option<PathBuf>,
    stages: Vec<FilterStage>,
}

impl FilterGraphSpec {
    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    /// Image file that must be passed as the second transcoder input.
    pub fn image_input(&self) -> Option<&Path> {
        self.image_input.as_deref()
    }

    pub fn visual_stages(&self) -> impl Iterator<Item = &FilterStage> {
        self.stages.iter().filter(|stage| stage.is_visual())
    }

    pub fn has_overlay(&self) -> bool {
        self.stages
            .iter()
            .any(|stage| matches!(stage, FilterStage::Overlay { .. }))
    }

    pub fn image_width(&self) -> Option<u32> {
        self.stages.iter().find_map(|stage| match stage {
            FilterStage::Scale { width } => Some(*width),
            _ => None,
        })
    }

    pub fn font_size(&self) -> Option<u32> {
        self.stages.iter().find_map(|stage| match stage {
            FilterStage::DrawText(draw) => Some(draw.font_size),
            _ => None,
        })
    }

    /// Renders the `-filter_complex` description. The final video pad is
    /// labelled [`VIDEO_OUTPUT_LABEL`].
    pub fn render(&self) -> String {
        let last_visual = self.stages.iter().rposition(FilterStage::is_visual);
        let mut chains = Vec::new();
        let mut image_filters = Vec::new();
        let mut current = MAIN_INPUT.to_string();

        for (index, stage) in self.stages.iter().enumerate() {
            let label = if Some(index) == last_visual {
                VIDEO_OUTPUT_LABEL.to_string()
            } else {
                format!("v{index}")
            };
            match stage {
                FilterStage::Overlay { .. } => {
                    let image_pad = if image_filters.is_empty() {
                        IMAGE_INPUT.to_string()
                    } else {
                        chains.push(format!(
                            "[{IMAGE_INPUT}]{}[{IMAGE_LABEL}]",
                            image_filters.join(",")
                        ));
                        IMAGE_LABEL.to_string()
                    };
                    chains.push(format!("[{current}][{image_pad}]{}[{label}]", stage.render()));
                    current = label;
                }
                FilterStage::DrawText(_) => {
                    chains.push(format!("[{current}]{}[{label}]", stage.render()));
                    current = label;
                }
                _ => image_filters.push(stage.render()),
            }
        }
        chains.join(";")
    }
}

/// Computes every graph parameter from the frame size. Pure: the font and the
/// image asset are already resolved inside [`WatermarkAssets`].
#[derive(Debug, Clone)]
pub struct FilterGraphBuilder {
    image: ImageSection,
    text: TextSection,
}

impl FilterGraphBuilder {
    pub fn new(config: &WatermarkConfig) -> Self {
        Self {
            image: config.image.clone(),
            text: config.text.clone(),
        }
    }

    pub fn image_width(&self, dimensions: ResolvedDimensions) -> u32 {
        scaled(dimensions.width(), self.image.scale_factor, self.image.min_width)
    }

    pub fn font_size(&self, dimensions: ResolvedDimensions) -> u32 {
        scaled(
            dimensions.height(),
            self.text.font_scale_factor,
            self.text.min_font_size,
        )
    }

    pub fn build(
        &self,
        dimensions: ResolvedDimensions,
        assets: &WatermarkAssets,
    ) -> FilterGraphSpec {
        let mut stages = Vec::with_capacity(5);
        if assets.image_path.is_some() {
            stages.push(FilterStage::Scale {
                width: self.image_width(dimensions),
            });
            stages.push(FilterStage::Format {
                pixel_format: self.image.pixel_format.clone(),
            });
            stages.push(FilterStage::OpacityMix {
                alpha: assets.image_opacity,
            });
            stages.push(FilterStage::Overlay {
                x: self.image.offset_x,
                y: self.image.offset_y,
            });
        }
        stages.push(FilterStage::DrawText(DrawText {
            text: assets.text.clone(),
            font_file: assets.font_path.clone(),
            font_size: self.font_size(dimensions),
            color: self.text.color.clone(),
            opacity: assets.text_opacity,
            bottom_margin: self.text.bottom_margin,
        }));
        FilterGraphSpec {
            image_input: assets.image_path.clone(),
            stages,
        }
    }
}

/// `max(floor, value * factor)` in whole pixels. The product is truncated;
/// the epsilon absorbs representation error such as `0.29 * 100`.
fn scaled(value: u32, factor: f64, floor: u32) -> u32 {
    let raw = (f64::from(value) * factor + 1e-9).floor();
    let raw = if raw.is_finite() && raw > 0.0 {
        raw.min(f64::from(u32::MAX)) as u32
    } else {
        0
    };
    raw.max(floor)
}

fn escape_with(value: &str, specials: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if specials.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// drawtext expands `%{...}` sequences and backslash escapes in its text.
fn escape_expansion(value: &str) -> String {
    escape_with(value, &['\\', '%'])
}

/// Escaping inside a `key=value:key=value` option list.
fn escape_option(value: &str) -> String {
    escape_with(value, &['\\', '\'', ':'])
}

/// Escaping of the whole filter description inside the graph.
fn escape_graph(value: &str) -> String {
    escape_with(value, &['\\', '\'', '[', ']', ',', ';'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets(image: bool, font: bool) -> WatermarkAssets {
        WatermarkAssets {
            image_path: image.then(|| PathBuf::from("/tmp/wm.png")),
            text: "join @mnbots in telegram".into(),
            text_opacity: 0.8,
            image_opacity: 0.7,
            font_path: font.then(|| PathBuf::from("/fonts/DejaVuSans.ttf")),
        }
    }

    fn builder() -> FilterGraphBuilder {
        FilterGraphBuilder::new(&WatermarkConfig::default())
    }

    fn dims(width: u32, height: u32) -> ResolvedDimensions {
        ResolvedDimensions::new(width, height).unwrap()
    }

    #[test]
    fn hd_direct_video_scales_marks() {
        let graph = builder().build(dims(1280, 720), &assets(true, true));
        assert_eq!(graph.image_width(), Some(128));
        assert_eq!(graph.font_size(), Some(21));
        assert!(graph.has_overlay());
        assert_eq!(graph.image_input(), Some(Path::new("/tmp/wm.png")));
    }

    #[test]
    fn fallback_dimensions_clamp_font_to_floor() {
        let graph = builder().build(ResolvedDimensions::FALLBACK, &assets(false, true));
        assert_eq!(graph.font_size(), Some(18));
    }

    #[test]
    fn narrow_input_clamps_image_to_floor() {
        let builder = builder();
        assert_eq!(builder.image_width(dims(320, 240)), 50);
        assert_eq!(builder.image_width(dims(499, 240)), 50);
        assert_eq!(builder.image_width(dims(510, 240)), 51);
        assert_eq!(builder.image_width(dims(3840, 2160)), 384);
    }

    #[test]
    fn sizes_follow_the_floor_formula() {
        let builder = builder();
        let sizes = [
            (1, 1),
            (176, 144),
            (854, 480),
            (1920, 1080),
            (1080, 1920),
            (7680, 4320),
        ];
        for (width, height) in sizes {
            let d = dims(width, height);
            let expected_font = ((f64::from(height) * 0.03 + 1e-9).floor() as u32).max(18);
            let expected_image = ((f64::from(width) * 0.10 + 1e-9).floor() as u32).max(50);
            assert_eq!(builder.font_size(d), expected_font, "{width}x{height}");
            assert_eq!(builder.image_width(d), expected_image, "{width}x{height}");
            assert!(builder.font_size(d) >= 18);
            assert!(builder.image_width(d) >= 50);
        }
    }

    #[test]
    fn missing_image_leaves_only_text_stage() {
        let graph = builder().build(dims(1280, 720), &assets(false, true));
        assert_eq!(graph.visual_stages().count(), 1);
        assert!(!graph.has_overlay());
        assert!(graph.image_input().is_none());
        assert!(graph.image_width().is_none());
        assert!(matches!(graph.stages(), [FilterStage::DrawText(_)]));
    }

    #[test]
    fn stages_are_ordered_image_first_text_last() {
        let graph = builder().build(dims(1280, 720), &assets(true, true));
        let kinds: Vec<&str> = graph
            .stages()
            .iter()
            .map(|stage| match stage {
                FilterStage::Scale { .. } => "scale",
                FilterStage::Format { .. } => "format",
                FilterStage::OpacityMix { .. } => "opacity",
                FilterStage::Overlay { .. } => "overlay",
                FilterStage::DrawText(_) => "drawtext",
            })
            .collect();
        assert_eq!(kinds, ["scale", "format", "opacity", "overlay", "drawtext"]);
    }

    #[test]
    fn renders_full_graph() {
        let graph = builder().build(dims(1280, 720), &assets(true, true));
        assert_eq!(
            graph.render(),
            "[1:v]scale=128:-1,format=rgba,colorchannelmixer=aa=0.7[wm];\
             [0:v][wm]overlay=10:10[v3];\
             [v3]drawtext=fontfile=/fonts/DejaVuSans.ttf:text=join @mnbots in telegram:\
             fontcolor=white@0.8:fontsize=21:x=(w-text_w)/2:y=h-text_h-10[vout]"
        );
    }

    #[test]
    fn renders_text_only_graph_without_font() {
        let graph = builder().build(dims(720, 480), &assets(false, false));
        assert_eq!(
            graph.render(),
            "[0:v]drawtext=text=join @mnbots in telegram:fontcolor=white@0.8:\
             fontsize=18:x=(w-text_w)/2:y=h-text_h-10[vout]"
        );
    }

    #[test]
    fn text_is_escaped_for_every_level() {
        let mut marks = assets(false, false);
        marks.text = "it's 100%: a, b [c]".into();
        let rendered = builder().build(dims(720, 480), &marks).render();
        assert!(rendered.contains(r"text=it\\\'s 100\\\\%\\: a\, b \[c\]:fontcolor"));
    }

    #[test]
    fn building_is_deterministic() {
        let builder = builder();
        let marks = assets(true, false);
        assert_eq!(
            builder.build(dims(1920, 1080), &marks),
            builder.build(dims(1920, 1080), &marks)
        );
    }
}
