mod artifacts;
mod error;
mod observer;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::assets::AssetProvisioner;
use crate::classify::{classify, InboundMediaRef};
use crate::command::{CommandExecutor, SystemCommandExecutor};
use crate::config::WatermarkConfig;
use crate::filter_graph::FilterGraphBuilder;
use crate::fonts::FontLocator;
use crate::messaging::{InboundItem, Messenger, StatusMessage, VideoReply};
use crate::probe::MediaProber;
use crate::resolver::DimensionResolver;
use crate::transcode::{TranscodeJob, Transcoder};
use crate::types::WatermarkAssets;

pub use artifacts::JobArtifacts;
pub use error::{PipelineError, PipelineResult, DOWNLOAD_FAILED_MESSAGE};
pub use observer::{JobObserver, TracingObserver};
pub use types::{
    JobReport, JobState, STATUS_COMPLETED, STATUS_DOWNLOADED, STATUS_DOWNLOADING,
    STATUS_PROCESSED,
};

/// Runs inbound items through download, marking, transcoding and reply.
/// Cheap to clone; every job runs on its own task via [`WatermarkPipeline::spawn`].
#[derive(Clone)]
pub struct WatermarkPipeline {
    config: Arc<WatermarkConfig>,
    messenger: Arc<dyn Messenger>,
    observer: Arc<dyn JobObserver>,
    provisioner: AssetProvisioner,
    prober: MediaProber,
    resolver: DimensionResolver,
    builder: FilterGraphBuilder,
    transcoder: Transcoder,
    font_path: Option<PathBuf>,
}

impl WatermarkPipeline {
    pub fn new(config: WatermarkConfig, messenger: Arc<dyn Messenger>) -> PipelineResult<Self> {
        let config = Arc::new(config);
        let executor: Arc<dyn CommandExecutor> = Arc::new(SystemCommandExecutor);
        let prober = MediaProber::new(&config.probe, executor.clone());
        let font_path = FontLocator::new(config.text.font_candidates.iter()).locate();
        Ok(Self {
            provisioner: AssetProvisioner::new(&config)?,
            resolver: DimensionResolver::new(prober.clone(), &config.probe),
            builder: FilterGraphBuilder::new(&config),
            transcoder: Transcoder::new(&config.transcode, executor),
            prober,
            messenger,
            observer: Arc::new(TracingObserver),
            font_path,
            config,
        })
    }

    /// Routes ffmpeg and ffprobe through `executor`.
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.prober = MediaProber::new(&self.config.probe, executor.clone());
        self.resolver = DimensionResolver::new(self.prober.clone(), &self.config.probe);
        self.transcoder = Transcoder::new(&self.config.transcode, executor);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_font_path(mut self, font_path: Option<PathBuf>) -> Self {
        self.font_path = font_path;
        self
    }

    pub fn config(&self) -> &WatermarkConfig {
        &self.config
    }

    pub fn spawn(&self, item: InboundItem) -> JoinHandle<JobReport> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.handle(item).await })
    }

    /// Processes one item to a terminal state. The sender always receives a
    /// final message and every temp file is gone when this returns.
    pub async fn handle(&self, item: InboundItem) -> JobReport {
        let media = classify(&item.attachment);
        let job_id = Uuid::new_v4();
        let mut job = JobTracker {
            report: JobReport::new(job_id, item.chat_id, item.message_id, media.kind),
            observer: self.observer.as_ref(),
        };
        job.report.file_name = media.file_name.clone();

        if !media.is_supported() {
            info!(job = %job_id, chat = item.chat_id, "unsupported media, replying with guidance");
            let guidance = PipelineError::Rejected.user_message(&self.config.replies);
            if let Err(err) = self
                .messenger
                .send_text(item.chat_id, Some(item.message_id), &guidance)
                .await
            {
                error!(job = %job_id, error = %err, "failed to send guidance reply");
            }
            job.advance(JobState::Rejected).await;
            return job.finish().await;
        }

        let mut artifacts = match JobArtifacts::create(&self.config.work_dir(), job_id).await {
            Ok(artifacts) => artifacts,
            Err(err) => {
                let err = PipelineError::from(err);
                self.reply_failure(&mut job, None, &item, err).await;
                return job.finish().await;
            }
        };

        let mut status = None;
        let outcome = self
            .run(&item, &media, &mut job, &mut artifacts, &mut status)
            .await;
        if let Err(err) = outcome {
            self.reply_failure(&mut job, status.as_mut(), &item, err).await;
        }

        job.advance(JobState::Cleanup).await;
        artifacts.cleanup().await;
        job.finish().await
    }

    async fn run(
        &self,
        item: &InboundItem,
        media: &InboundMediaRef,
        job: &mut JobTracker<'_>,
        artifacts: &mut JobArtifacts,
        status: &mut Option<StatusMessage>,
    ) -> PipelineResult<()> {
        let image_path = self
            .provisioner
            .ensure_default_image_asset()
            .await
            .then(|| self.provisioner.cache_path().to_path_buf());
        if image_path.is_none() {
            job.degraded("asset", "default watermark image unavailable").await;
        }

        job.advance(JobState::Downloading).await;
        let messenger = self.messenger.as_ref();
        let status = status.insert(
            StatusMessage::send(
                messenger,
                item.chat_id,
                Some(item.message_id),
                STATUS_DOWNLOADING,
            )
            .await?,
        );
        let input = self
            .messenger
            .download(item, artifacts.job_dir())
            .await
            .map_err(|err| PipelineError::Download(err.to_string()))?
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| PipelineError::Download("transport returned no file".into()))?;
        let downloaded = fs::metadata(&input)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !downloaded {
            return Err(PipelineError::Download(format!(
                "{} is not a downloaded file",
                input.display()
            )));
        }
        artifacts.track_input(input.clone());
        job.advance(JobState::Downloaded).await;
        status.update(messenger, STATUS_DOWNLOADED).await?;

        job.advance(JobState::Processing).await;
        let resolution = self.resolver.resolve(media, &input).await;
        if let Some(reason) = resolution.dimensions.reason() {
            job.degraded("dimensions", reason).await;
        }
        let dimensions = *resolution.dimensions.value();
        job.report.dimensions = Some(dimensions);
        job.report.dimensions_degraded = resolution.dimensions.is_degraded();

        let assets =
            WatermarkAssets::from_config(&self.config, image_path, self.font_path.clone());
        let graph = self.builder.build(dimensions, &assets);
        job.report.image_applied = graph.has_overlay();
        job.report.font_size = graph.font_size();

        let base_name = base_name(&input);
        let output = artifacts.reserve_output(&input);
        self.transcoder
            .run(TranscodeJob {
                input_path: input,
                output_path: output.clone(),
                graph,
                audio_present: resolution.audio_present,
                metadata: self.metadata_tags(&base_name),
            })
            .await?;
        job.advance(JobState::Processed).await;
        status.update(messenger, STATUS_PROCESSED).await?;

        job.advance(JobState::Uploading).await;
        let metadata = self.prober.output_metadata(&output).await;
        if let Some(reason) = metadata.reason() {
            job.degraded("output_metadata", reason).await;
        }
        job.report.metadata_degraded = metadata.is_degraded();
        let metadata = metadata.into_value();
        job.report.metadata = Some(metadata);

        let reply = VideoReply {
            path: output,
            caption: self.caption(&base_name),
            duration: metadata.duration_seconds,
            width: metadata.width,
            height: metadata.height,
            supports_streaming: true,
        };
        self.messenger
            .send_video(item.chat_id, Some(item.message_id), &reply)
            .await?;
        status.update(messenger, STATUS_COMPLETED).await?;
        job.advance(JobState::Completed).await;
        Ok(())
    }

    async fn reply_failure(
        &self,
        job: &mut JobTracker<'_>,
        status: Option<&mut StatusMessage>,
        item: &InboundItem,
        err: PipelineError,
    ) {
        error!(job = %job.report.job_id, error = %err, "job failed");
        let text = err.user_message(&self.config.replies);
        let messenger = self.messenger.as_ref();
        let sent = match status {
            Some(status) => status.update(messenger, &text).await.map(|_| ()),
            None => messenger
                .send_text(item.chat_id, Some(item.message_id), &text)
                .await
                .map(|_| ()),
        };
        if let Err(reply_err) = sent {
            error!(job = %job.report.job_id, error = %reply_err, "failed to deliver failure reply");
        }
        job.report.error = Some(err.to_string());
        job.advance(JobState::Failed).await;
    }

    fn caption(&self, base_name: &str) -> String {
        self.config
            .replies
            .caption_template
            .replace("{text}", &self.config.assets.text)
            .replace("{name}", base_name)
    }

    fn metadata_tags(&self, base_name: &str) -> Vec<(String, String)> {
        let transcode = &self.config.transcode;
        [
            ("title", &transcode.metadata_title),
            ("comment", &transcode.metadata_comment),
        ]
        .into_iter()
        .filter(|(_, template)| !template.is_empty())
        .map(|(key, template)| (key.to_string(), template.replace("{name}", base_name)))
        .collect()
    }
}

fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".into())
}

struct JobTracker<'a> {
    report: JobReport,
    observer: &'a dyn JobObserver,
}

impl JobTracker<'_> {
    async fn advance(&mut self, next: JobState) {
        let current = self.report.state;
        if !current.can_transition_to(next) {
            warn!(
                job = %self.report.job_id,
                from = ?current,
                to = ?next,
                "unexpected job transition"
            );
        }
        // Cleanup is reported but the report keeps the terminal state.
        if next != JobState::Cleanup {
            self.report.state = next;
        }
        self.observer
            .on_transition(self.report.job_id, current, next)
            .await;
    }

    async fn degraded(&self, stage: &'static str, reason: &str) {
        self.observer
            .on_degraded(self.report.job_id, stage, reason)
            .await;
    }

    async fn finish(mut self) -> JobReport {
        self.report.finished_at = Some(Utc::now());
        self.observer.on_finished(&self.report).await;
        self.report
    }
}
