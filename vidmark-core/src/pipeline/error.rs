use thiserror::Error;

use crate::assets::AssetError;
use crate::config::RepliesSection;
use crate::messaging::MessagingError;
use crate::transcode::TranscodeError;

pub const DOWNLOAD_FAILED_MESSAGE: &str = "Failed to download the video.";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported media")]
    Rejected,
    #[error("download failed: {0}")]
    Download(String),
    #[error("transcode failed: {0}")]
    Transcode(#[from] TranscodeError),
    #[error("{0}")]
    Unexpected(String),
}

impl PipelineError {
    /// Final reply shown to the sender for this failure.
    pub fn user_message(&self, replies: &RepliesSection) -> String {
        match self {
            PipelineError::Rejected => replies.unsupported_message.clone(),
            PipelineError::Download(_) => DOWNLOAD_FAILED_MESSAGE.to_string(),
            PipelineError::Transcode(err) => format!(
                "Error applying watermarks: {}",
                keep_tail(&err.diagnostic(), replies.max_diagnostic_chars)
            ),
            PipelineError::Unexpected(reason) => format!(
                "An unexpected error occurred: {}",
                keep_tail(reason, replies.max_diagnostic_chars)
            ),
        }
    }
}

impl From<MessagingError> for PipelineError {
    fn from(error: MessagingError) -> Self {
        PipelineError::Unexpected(error.to_string())
    }
}

impl From<AssetError> for PipelineError {
    fn from(error: AssetError) -> Self {
        PipelineError::Unexpected(error.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        PipelineError::Unexpected(error.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Last `max` characters of `text`; ffmpeg puts the cause at the end.
pub(crate) fn keep_tail(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    let tail: String = text.chars().skip(total - max).collect();
    format!("...{tail}")
}
