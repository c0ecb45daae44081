use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::command::CommandExecutor;
use crate::config::ProbeSection;
use crate::fallback::Fallback;
use crate::types::{OutputMetadata, ResolvedDimensions};

pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("ffprobe exited with status {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
    #[error("ffprobe timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid ffprobe payload: {0}")]
    Parse(String),
    #[error("no usable video stream in {0}")]
    MissingVideoStream(PathBuf),
}

impl From<serde_json::Error> for ProbeError {
    fn from(source: serde_json::Error) -> Self {
        ProbeError::Parse(source.to_string())
    }
}

/// Stream-level facts about a media file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaSummary {
    pub has_video: bool,
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
    pub has_audio: bool,
    pub duration_seconds: Option<f64>,
}

impl MediaSummary {
    pub fn dimensions(&self) -> Option<ResolvedDimensions> {
        ResolvedDimensions::new(self.video_width?, self.video_height?)
    }
}

#[derive(Clone)]
pub struct MediaProber {
    ffprobe: PathBuf,
    timeout: Duration,
    executor: Arc<dyn CommandExecutor>,
}

impl MediaProber {
    pub fn new(section: &ProbeSection, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            ffprobe: PathBuf::from(&section.ffprobe),
            timeout: section.timeout(),
            executor,
        }
    }

    pub async fn probe(&self, path: &Path) -> ProbeResult<MediaSummary> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            "-show_format".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = match timeout(self.timeout, self.executor.run(&self.ffprobe, &args)).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ProbeError::Spawn {
                    program: self.ffprobe.clone(),
                    source,
                })
            }
            Err(_) => return Err(ProbeError::Timeout(self.timeout)),
        };
        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let summary = parsed.summarize();
        debug!(file = %path.display(), ?summary, "probed media");
        Ok(summary)
    }

    /// Duration and frame size of a produced file. Never fails: any probing
    /// problem yields all-zero metadata.
    pub async fn output_metadata(&self, path: &Path) -> Fallback<OutputMetadata> {
        match self.probe(path).await {
            Ok(summary) => Fallback::Value(OutputMetadata {
                duration_seconds: summary
                    .duration_seconds
                    .filter(|value| value.is_finite() && *value > 0.0)
                    .map(|value| value.trunc() as u64)
                    .unwrap_or(0),
                width: summary.video_width.unwrap_or(0),
                height: summary.video_height.unwrap_or(0),
            }),
            Err(err) => {
                warn!(
                    file = %path.display(),
                    error = %err,
                    "could not probe output video, using zeroed metadata"
                );
                Fallback::degraded(OutputMetadata::default(), err.to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

impl FfprobeOutput {
    fn summarize(&self) -> MediaSummary {
        let video = self
            .streams
            .iter()
            .find(|stream| stream.codec_type.as_deref() == Some("video"));
        let has_audio = self
            .streams
            .iter()
            .any(|stream| stream.codec_type.as_deref() == Some("audio"));
        let duration_seconds = self
            .format
            .duration
            .as_deref()
            .and_then(|value| value.parse::<f64>().ok());
        MediaSummary {
            has_video: video.is_some(),
            video_width: video.and_then(|stream| stream.width),
            video_height: video.and_then(|stream| stream.height),
            has_audio,
            duration_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::process::{ExitStatus, Output};

    #[cfg(unix)]
    use std::os::unix::process::ExitStatusExt;
    #[cfg(windows)]
    use std::os::windows::process::ExitStatusExt;

    struct CannedExecutor {
        code: i32,
        stdout: &'static str,
    }

    #[async_trait]
    impl CommandExecutor for CannedExecutor {
        async fn run(&self, _program: &Path, _args: &[String]) -> std::io::Result<Output> {
            #[cfg(unix)]
            let status = ExitStatus::from_raw(self.code << 8);
            #[cfg(windows)]
            let status = ExitStatus::from_raw(self.code as u32);
            Ok(Output {
                status,
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: b"probe stderr".to_vec(),
            })
        }
    }

    fn prober(code: i32, stdout: &'static str) -> MediaProber {
        MediaProber::new(
            &ProbeSection::default(),
            Arc::new(CannedExecutor { code, stdout }),
        )
    }

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "aac"},
            {"index": 1, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}
        ],
        "format": {"duration": "42.917000"}
    }"#;

    #[tokio::test]
    async fn summarizes_first_video_stream_and_audio() {
        let summary = prober(0, SAMPLE).probe(Path::new("in.mp4")).await.unwrap();
        assert!(summary.has_video);
        assert!(summary.has_audio);
        assert_eq!(summary.dimensions(), ResolvedDimensions::new(1920, 1080));
    }

    #[tokio::test]
    async fn output_metadata_truncates_duration() {
        let metadata = prober(0, SAMPLE)
            .output_metadata(Path::new("out.mp4"))
            .await;
        assert!(!metadata.is_degraded());
        assert_eq!(
            metadata.into_value(),
            OutputMetadata {
                duration_seconds: 42,
                width: 1920,
                height: 1080,
            }
        );
    }

    #[tokio::test]
    async fn failing_probe_yields_zeroed_metadata() {
        let metadata = prober(1, "").output_metadata(Path::new("out.mp4")).await;
        assert!(metadata.is_degraded());
        assert_eq!(metadata.into_value(), OutputMetadata::default());
    }

    #[tokio::test]
    async fn missing_sections_are_zero_not_errors() {
        let metadata = prober(0, r#"{"streams": []}"#)
            .output_metadata(Path::new("out.mp4"))
            .await;
        assert!(!metadata.is_degraded());
        assert_eq!(metadata.into_value(), OutputMetadata::default());
    }

    #[tokio::test]
    async fn garbage_payload_is_a_parse_error() {
        let err = prober(0, "not json").probe(Path::new("in.mp4")).await.unwrap_err();
        assert!(matches!(err, ProbeError::Parse(_)));
    }
}
