use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::classify::MediaKind;
use crate::types::{OutputMetadata, ResolvedDimensions};

pub const STATUS_DOWNLOADING: &str = "Downloading video...";
pub const STATUS_DOWNLOADED: &str = "Downloaded. Applying watermarks...";
pub const STATUS_PROCESSED: &str = "Watermarks applied. Uploading...";
pub const STATUS_COMPLETED: &str = "Watermarked video uploaded successfully!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Received,
    Downloading,
    Downloaded,
    Processing,
    Processed,
    Uploading,
    Completed,
    Failed,
    /// Unsupported media; never downloaded.
    Rejected,
    Cleanup,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Rejected)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Received, Downloading)
            | (Downloading, Downloaded)
            | (Downloaded, Processing)
            | (Processing, Processed)
            | (Processed, Uploading)
            | (Uploading, Completed)
            | (Received, Rejected) => true,
            (from, Failed) => !from.is_terminal() && from != Cleanup,
            (from, Cleanup) => from.is_terminal(),
            _ => false,
        }
    }
}

/// Outcome of one inbound item, emitted once the job has been cleaned up.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub chat_id: i64,
    pub message_id: i64,
    pub state: JobState,
    pub kind: MediaKind,
    pub file_name: Option<String>,
    pub dimensions: Option<ResolvedDimensions>,
    pub dimensions_degraded: bool,
    pub image_applied: bool,
    pub font_size: Option<u32>,
    pub metadata: Option<OutputMetadata>,
    pub metadata_degraded: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobReport {
    pub(crate) fn new(job_id: Uuid, chat_id: i64, message_id: i64, kind: MediaKind) -> Self {
        Self {
            job_id,
            chat_id,
            message_id,
            state: JobState::Received,
            kind,
            file_name: None,
            dimensions: None,
            dimensions_degraded: false,
            image_applied: false,
            font_size: None,
            metadata: None,
            metadata_degraded: false,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Completed
    }
}
