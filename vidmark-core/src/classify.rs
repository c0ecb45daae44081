use std::path::Path;

use serde::Serialize;

use crate::messaging::Attachment;
use crate::types::ResolvedDimensions;

/// Container extensions accepted from generic file uploads.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v", "3gp", "ts", "mts",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    DirectVideo,
    VideoDocument,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMediaRef {
    pub kind: MediaKind,
    pub declared_width: Option<u32>,
    pub declared_height: Option<u32>,
    pub file_name: Option<String>,
}

impl InboundMediaRef {
    fn unsupported() -> Self {
        Self {
            kind: MediaKind::Unsupported,
            declared_width: None,
            declared_height: None,
            file_name: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.kind != MediaKind::Unsupported
    }

    /// Declared size, only when both sides are known and non-zero.
    pub fn declared_dimensions(&self) -> Option<ResolvedDimensions> {
        ResolvedDimensions::new(self.declared_width?, self.declared_height?)
    }
}

pub fn classify(attachment: &Attachment) -> InboundMediaRef {
    match attachment {
        Attachment::Video(video) => InboundMediaRef {
            kind: MediaKind::DirectVideo,
            declared_width: Some(video.width),
            declared_height: Some(video.height),
            file_name: video.file_name.clone(),
        },
        Attachment::Document(document)
            if is_video_mime(document.mime_type.as_deref())
                || has_supported_extension(document.file_name.as_deref()) =>
        {
            InboundMediaRef {
                kind: MediaKind::VideoDocument,
                declared_width: document.width,
                declared_height: document.height,
                file_name: document.file_name.clone(),
            }
        }
        Attachment::Document(_) | Attachment::Other { .. } => InboundMediaRef::unsupported(),
    }
}

fn is_video_mime(mime: Option<&str>) -> bool {
    mime.map(|value| value.trim().to_ascii_lowercase().starts_with("video/"))
        .unwrap_or(false)
}

fn has_supported_extension(file_name: Option<&str>) -> bool {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
