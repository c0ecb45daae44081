use std::path::Path;

use tracing::{debug, warn};

use crate::classify::InboundMediaRef;
use crate::config::ProbeSection;
use crate::fallback::Fallback;
use crate::probe::{MediaProber, ProbeError};
use crate::types::ResolvedDimensions;

/// Dimensions for the filter graph plus what was learned about audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub dimensions: Fallback<ResolvedDimensions>,
    /// `None` when the file was not probed.
    pub audio_present: Option<bool>,
}

#[derive(Clone)]
pub struct DimensionResolver {
    prober: MediaProber,
    fallback: ResolvedDimensions,
}

impl DimensionResolver {
    pub fn new(prober: MediaProber, section: &ProbeSection) -> Self {
        let fallback = ResolvedDimensions::new(section.fallback_width, section.fallback_height)
            .unwrap_or(ResolvedDimensions::FALLBACK);
        Self { prober, fallback }
    }

    pub fn fallback(&self) -> ResolvedDimensions {
        self.fallback
    }

    pub async fn resolve(&self, media: &InboundMediaRef, downloaded: &Path) -> Resolution {
        if let Some(declared) = media.declared_dimensions() {
            debug!(dimensions = %declared, "using declared dimensions");
            return Resolution {
                dimensions: Fallback::Value(declared),
                audio_present: None,
            };
        }

        let probed = self.prober.probe(downloaded).await;
        let audio_present = probed.as_ref().ok().map(|summary| summary.has_audio);
        let dimensions = probed.and_then(|summary| {
            summary
                .dimensions()
                .ok_or_else(|| ProbeError::MissingVideoStream(downloaded.to_path_buf()))
        });
        if let Err(err) = &dimensions {
            warn!(
                file = %downloaded.display(),
                error = %err,
                fallback = %self.fallback,
                "dimension probe failed, using fallback"
            );
        }
        Resolution {
            dimensions: Fallback::from_result(dimensions, || self.fallback),
            audio_present,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::MediaKind;
    use crate::command::CommandExecutor;
    use async_trait::async_trait;
    use std::process::{ExitStatus, Output};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[cfg(unix)]
    use std::os::unix::process::ExitStatusExt;
    #[cfg(windows)]
    use std::os::windows::process::ExitStatusExt;

    struct ScriptedProbe {
        success: bool,
        stdout: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandExecutor for ScriptedProbe {
        async fn run(&self, _program: &Path, _args: &[String]) -> std::io::Result<Output> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Output {
                status: ExitStatus::from_raw(if self.success { 0 } else { 1 }),
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
            })
        }
    }

    fn resolver(success: bool, stdout: &'static str) -> (DimensionResolver, Arc<ScriptedProbe>) {
        let executor = Arc::new(ScriptedProbe {
            success,
            stdout,
            calls: AtomicUsize::new(0),
        });
        let section = ProbeSection::default();
        let prober = MediaProber::new(&section, executor.clone());
        (DimensionResolver::new(prober, &section), executor)
    }

    fn media(width: Option<u32>, height: Option<u32>) -> InboundMediaRef {
        InboundMediaRef {
            kind: MediaKind::VideoDocument,
            declared_width: width,
            declared_height: height,
            file_name: Some("clip.mkv".into()),
        }
    }

    #[tokio::test]
    async fn declared_dimensions_skip_probing() {
        let (resolver, executor) = resolver(true, "{}");
        let resolution = resolver
            .resolve(&media(Some(1280), Some(720)), Path::new("clip.mkv"))
            .await;
        assert_eq!(
            resolution.dimensions,
            Fallback::Value(ResolvedDimensions::new(1280, 720).unwrap())
        );
        assert_eq!(resolution.audio_present, None);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_dimensions_are_probed() {
        let (resolver, executor) = resolver(
            true,
            r#"{"streams": [{"codec_type": "video", "width": 640, "height": 360}]}"#,
        );
        let resolution = resolver.resolve(&media(None, Some(0)), Path::new("clip.mkv")).await;
        assert_eq!(resolution.dimensions.into_value(), ResolvedDimensions::new(640, 360).unwrap());
        assert_eq!(resolution.audio_present, Some(false));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_probe_falls_back_to_720x480() {
        let (resolver, _) = resolver(false, "");
        let resolution = resolver.resolve(&media(None, None), Path::new("clip.mkv")).await;
        assert!(resolution.dimensions.is_degraded());
        assert_eq!(resolution.dimensions.into_value(), ResolvedDimensions::new(720, 480).unwrap());
        assert_eq!(resolution.audio_present, None);
    }

    #[tokio::test]
    async fn audio_only_file_falls_back() {
        let (resolver, _) = resolver(true, r#"{"streams": [{"codec_type": "audio"}]}"#);
        let resolution = resolver.resolve(&media(None, None), Path::new("song.mp4")).await;
        assert!(resolution.dimensions.is_degraded());
        assert_eq!(resolution.audio_present, Some(true));
    }
}
