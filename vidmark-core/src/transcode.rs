use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::command::{describe, CommandExecutor};
use crate::config::TranscodeSection;
use crate::filter_graph::{FilterGraphSpec, VIDEO_OUTPUT_LABEL};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("ffmpeg exited with status {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
    #[error("ffmpeg did not finish within {0:?}")]
    Timeout(Duration),
}

impl TranscodeError {
    /// Text suitable for showing to the sender.
    pub fn diagnostic(&self) -> String {
        match self {
            TranscodeError::Failed { stderr, status } if stderr.is_empty() => {
                format!("ffmpeg exited with status {status:?}")
            }
            TranscodeError::Failed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// One ffmpeg invocation. Consumed by [`Transcoder::run`].
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub graph: FilterGraphSpec,
    /// `None` when unknown; the audio map is then optional.
    pub audio_present: Option<bool>,
    /// Container tags written with `-metadata key=value`.
    pub metadata: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct Transcoder {
    settings: TranscodeSection,
    executor: Arc<dyn CommandExecutor>,
}

impl Transcoder {
    pub fn new(settings: &TranscodeSection, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            settings: settings.clone(),
            executor,
        }
    }

    pub fn program(&self) -> PathBuf {
        PathBuf::from(&self.settings.ffmpeg)
    }

    pub fn build_args(&self, job: &TranscodeJob) -> Vec<String> {
        let settings = &self.settings;
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            settings.log_level.clone(),
            "-y".to_string(),
            "-i".to_string(),
            job.input_path.to_string_lossy().to_string(),
        ];
        if let Some(image) = job.graph.image_input() {
            args.push("-i".into());
            args.push(image.to_string_lossy().to_string());
        }
        args.push("-filter_complex".into());
        args.push(job.graph.render());
        args.push("-map".into());
        args.push(format!("[{VIDEO_OUTPUT_LABEL}]"));
        match job.audio_present {
            Some(false) => args.push("-an".into()),
            Some(true) | None => {
                args.push("-map".into());
                args.push(if job.audio_present.is_some() { "0:a" } else { "0:a?" }.into());
                args.push("-c:a".into());
                args.push(settings.audio_codec.clone());
            }
        }
        args.extend([
            "-c:v".to_string(),
            settings.video_codec.clone(),
            "-preset".to_string(),
            settings.preset.clone(),
            "-crf".to_string(),
            settings.crf.to_string(),
            "-pix_fmt".to_string(),
            settings.pix_fmt.clone(),
        ]);
        if settings.faststart {
            args.push("-movflags".into());
            args.push("+faststart".into());
        }
        for (key, value) in &job.metadata {
            args.push("-metadata".into());
            args.push(format!("{key}={value}"));
        }
        args.push(job.output_path.to_string_lossy().to_string());
        args
    }

    pub async fn run(&self, job: TranscodeJob) -> TranscodeResult<()> {
        let program = self.program();
        let args = self.build_args(&job);
        let limit = self.settings.timeout();
        debug!(command = %describe(&program, &args), "starting transcode");

        let output = match timeout(limit, self.executor.run(&program, &args)).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(TranscodeError::Spawn { program, source }),
            Err(_) => return Err(TranscodeError::Timeout(limit)),
        };
        if !output.status.success() {
            return Err(TranscodeError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        info!(output = %job.output_path.display(), "transcode finished");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::WatermarkConfig;
    use crate::filter_graph::FilterGraphBuilder;
    use crate::types::{ResolvedDimensions, WatermarkAssets};
    use async_trait::async_trait;
    use std::path::Path;
    use std::process::{ExitStatus, Output};
    use std::sync::Mutex;

    use std::os::unix::process::ExitStatusExt;

    enum Behaviour {
        Succeed,
        Fail(&'static str),
        Hang,
    }

    struct FakeFfmpeg {
        behaviour: Behaviour,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl FakeFfmpeg {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for FakeFfmpeg {
        async fn run(&self, _program: &Path, args: &[String]) -> std::io::Result<Output> {
            self.seen.lock().unwrap().push(args.to_vec());
            let (code, stderr) = match self.behaviour {
                Behaviour::Succeed => (0, ""),
                Behaviour::Fail(stderr) => (1, stderr),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    (0, "")
                }
            };
            Ok(Output {
                status: ExitStatus::from_raw(code << 8),
                stdout: Vec::new(),
                stderr: stderr.as_bytes().to_vec(),
            })
        }
    }

    fn job(image: bool, audio_present: Option<bool>) -> TranscodeJob {
        let config = WatermarkConfig::default();
        let assets = WatermarkAssets::from_config(
            &config,
            image.then(|| PathBuf::from("/cache/wm.png")),
            None,
        );
        let graph = FilterGraphBuilder::new(&config)
            .build(ResolvedDimensions::new(1280, 720).unwrap(), &assets);
        TranscodeJob {
            input_path: PathBuf::from("/work/in.mkv"),
            output_path: PathBuf::from("/work/watermarked_in.mp4"),
            graph,
            audio_present,
            metadata: vec![("title".into(), "in".into())],
        }
    }

    fn transcoder(executor: Arc<FakeFfmpeg>) -> Transcoder {
        Transcoder::new(&TranscodeSection::default(), executor)
    }

    fn position(args: &[String], value: &str) -> usize {
        args.iter().position(|arg| arg == value).unwrap()
    }

    #[test]
    fn arguments_carry_fixed_codec_settings() {
        let args = transcoder(FakeFfmpeg::new(Behaviour::Succeed)).build_args(&job(true, None));
        let joined = args.join(" ");
        assert!(joined.starts_with(
            "-hide_banner -loglevel error -y -i /work/in.mkv -i /cache/wm.png -filter_complex "
        ));
        assert!(joined.contains("-map [vout] -map 0:a? -c:a copy"));
        assert!(joined.contains("-c:v libx264 -preset medium -crf 26 -pix_fmt yuv420p"));
        assert!(joined.contains("-movflags +faststart"));
        assert!(joined.contains("-metadata title=in"));
        assert_eq!(args.last().map(String::as_str), Some("/work/watermarked_in.mp4"));
    }

    #[test]
    fn audio_mapping_follows_probe_result() {
        let transcoder = transcoder(FakeFfmpeg::new(Behaviour::Succeed));
        let with_audio = transcoder.build_args(&job(false, Some(true)));
        assert_eq!(with_audio[position(&with_audio, "-c:a") - 1], "0:a");

        let silent = transcoder.build_args(&job(false, Some(false)));
        assert!(silent.contains(&"-an".to_string()));
        assert!(!silent.contains(&"-c:a".to_string()));
    }

    #[test]
    fn text_only_graph_has_single_input() {
        let args = transcoder(FakeFfmpeg::new(Behaviour::Succeed)).build_args(&job(false, None));
        assert_eq!(args.iter().filter(|arg| *arg == "-i").count(), 1);
        let graph = &args[position(&args, "-filter_complex") + 1];
        assert!(graph.starts_with("[0:v]drawtext="));
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let executor =
            FakeFfmpeg::new(Behaviour::Fail("Invalid data found when processing input\n"));
        let err = transcoder(executor.clone()).run(job(true, None)).await.unwrap_err();
        assert!(matches!(err, TranscodeError::Failed { status: Some(1), .. }));
        assert_eq!(err.diagnostic(), "Invalid data found when processing input");
        assert_eq!(executor.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_transcode_times_out() {
        let err = transcoder(FakeFfmpeg::new(Behaviour::Hang))
            .run(job(false, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranscodeError::Timeout(limit) if limit == Duration::from_secs(1800)
        ));
    }

    #[tokio::test]
    async fn successful_run() {
        transcoder(FakeFfmpeg::new(Behaviour::Succeed))
            .run(job(true, Some(true)))
            .await
            .unwrap();
    }
}
