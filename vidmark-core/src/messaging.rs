use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type MessagingResult<T> = Result<T, MessagingError>;

/// One incoming event carrying a possible video.
#[derive(Debug, Clone)]
pub struct InboundItem {
    pub chat_id: i64,
    pub message_id: i64,
    /// Transport-specific handle used by [`Messenger::download`].
    pub file_ref: String,
    pub attachment: Attachment,
}

#[derive(Debug, Clone)]
pub enum Attachment {
    /// Native video message; the transport already knows its frame size.
    Video(VideoInfo),
    /// Generic file upload.
    Document(DocumentInfo),
    Other { kind: String },
}

#[derive(Debug, Clone, Default)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub duration: Option<u32>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReply {
    pub path: PathBuf,
    pub caption: String,
    pub duration: u64,
    pub width: u32,
    pub height: u32,
    pub supports_streaming: bool,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Stores the item's file under `dest_dir` keeping its original base name.
    /// `None` means the transport produced no file.
    async fn download(&self, item: &InboundItem, dest_dir: &Path)
        -> MessagingResult<Option<PathBuf>>;

    async fn send_text(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> MessagingResult<MessageRef>;

    async fn edit_text(&self, message: &MessageRef, text: &str) -> MessagingResult<()>;

    async fn send_video(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        video: &VideoReply,
    ) -> MessagingResult<MessageRef>;
}

/// A status message whose text is only rewritten when it actually changes.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    message: MessageRef,
    displayed: String,
}

impl StatusMessage {
    pub async fn send(
        messenger: &dyn Messenger,
        chat_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> MessagingResult<Self> {
        let message = messenger.send_text(chat_id, reply_to, text).await?;
        Ok(Self {
            message,
            displayed: text.to_string(),
        })
    }

    pub fn message(&self) -> &MessageRef {
        &self.message
    }

    pub fn displayed(&self) -> &str {
        &self.displayed
    }

    /// Returns `false` when `text` is already displayed and no edit was made.
    pub async fn update(
        &mut self,
        messenger: &dyn Messenger,
        text: &str,
    ) -> MessagingResult<bool> {
        if self.displayed == text {
            debug!(message_id = self.message.message_id, "status unchanged, skipping edit");
            return Ok(false);
        }
        messenger.edit_text(&self.message, text).await?;
        self.displayed = text.to_string();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingMessenger {
        edits: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Messenger for CountingMessenger {
        async fn download(
            &self,
            _item: &InboundItem,
            _dest_dir: &Path,
        ) -> MessagingResult<Option<PathBuf>> {
            Ok(None)
        }

        async fn send_text(
            &self,
            chat_id: i64,
            _reply_to: Option<i64>,
            _text: &str,
        ) -> MessagingResult<MessageRef> {
            Ok(MessageRef {
                chat_id,
                message_id: 1,
            })
        }

        async fn edit_text(&self, _message: &MessageRef, text: &str) -> MessagingResult<()> {
            self.edits.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send_video(
            &self,
            chat_id: i64,
            _reply_to: Option<i64>,
            _video: &VideoReply,
        ) -> MessagingResult<MessageRef> {
            Ok(MessageRef {
                chat_id,
                message_id: 2,
            })
        }
    }

    #[tokio::test]
    async fn repeated_update_edits_once() {
        let messenger = CountingMessenger::default();
        let mut status = StatusMessage::send(&messenger, 5, None, "Downloading video...")
            .await
            .unwrap();

        assert!(status.update(&messenger, "Uploading...").await.unwrap());
        assert!(!status.update(&messenger, "Uploading...").await.unwrap());

        assert_eq!(*messenger.edits.lock().unwrap(), vec!["Uploading...".to_string()]);
        assert_eq!(status.displayed(), "Uploading...");
    }

    #[tokio::test]
    async fn update_to_initial_text_is_a_noop() {
        let messenger = CountingMessenger::default();
        let mut status = StatusMessage::send(&messenger, 5, Some(9), "Downloading video...")
            .await
            .unwrap();
        assert!(!status.update(&messenger, "Downloading video...").await.unwrap());
        assert!(messenger.edits.lock().unwrap().is_empty());
    }
}
