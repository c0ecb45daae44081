use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vidmark_core::{
    load_watermark_config_or_default, AssetError, AssetProvisioner, Attachment, DocumentInfo,
    FilterGraphBuilder, FontLocator, InboundItem, JobReport, MessageRef, Messenger,
    MessagingError, MessagingResult, PipelineError, ResolvedDimensions, SystemCommandExecutor,
    TranscodeJob, Transcoder, VideoReply, WatermarkAssets, WatermarkConfig, WatermarkPipeline,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] vidmark_core::ConfigError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("required resource missing: {0}")]
    MissingResource(String),
    #[error("{failed} of {total} jobs failed")]
    JobsFailed { failed: usize, total: usize },
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "vidmark watermark pipeline control interface",
    long_about = None
)]
pub struct Cli {
    /// Path to vidmark.toml; a missing file means built-in defaults
    #[arg(long, default_value = "configs/vidmark.toml")]
    pub config: PathBuf,
    /// Overrides paths.work_dir
    #[arg(long)]
    pub work_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Debug logging unless RUST_LOG is set
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watermarks local video files
    Process(ProcessArgs),
    /// Prints the filter graph and ffmpeg arguments for a frame size
    Graph(GraphArgs),
    /// Ensures the default watermark image is cached
    Assets,
    /// Prints the effective configuration
    Config,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Video files to watermark
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Where watermarked videos are written
    #[arg(long, default_value = "./watermarked")]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct GraphArgs {
    #[arg(long)]
    pub width: u32,
    #[arg(long)]
    pub height: u32,
    /// Preview the text-only graph
    #[arg(long, default_value_t = false)]
    pub no_image: bool,
}

pub fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(env_filter)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Process(args) => {
            let summary = context.process(args)?;
            render(&summary, cli.format)?;
            let failed = summary.failed();
            if failed > 0 {
                return Err(AppError::JobsFailed {
                    failed,
                    total: summary.reports.len(),
                });
            }
        }
        Commands::Graph(args) => {
            let preview = context.graph_preview(args)?;
            render(&preview, cli.format)?;
        }
        Commands::Assets => {
            let status = context.ensure_assets()?;
            render(&status, cli.format)?;
            if !status.available {
                return Err(AppError::MissingResource(format!(
                    "default watermark image {}",
                    status.path.display()
                )));
            }
        }
        Commands::Config => {
            let effective = context.effective_config()?;
            render(&effective, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: WatermarkConfig,
    config_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = load_watermark_config_or_default(&cli.config)?;
        if let Some(work_dir) = &cli.work_dir {
            config.paths.work_dir = work_dir.to_string_lossy().to_string();
        }
        Ok(Self {
            config,
            config_path: cli.config.clone(),
        })
    }

    fn runtime() -> Result<tokio::runtime::Runtime> {
        Ok(tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?)
    }

    fn process(&self, args: &ProcessArgs) -> Result<ProcessSummary> {
        let items = inbound_items(&args.files)?;
        let messenger = Arc::new(LocalMessenger::new(&args.output_dir));
        let runtime = Self::runtime()?;
        let reports = runtime.block_on(async {
            let pipeline = WatermarkPipeline::new(self.config.clone(), messenger.clone())?;
            let handles: Vec<_> = items.into_iter().map(|item| pipeline.spawn(item)).collect();
            let mut reports = Vec::with_capacity(handles.len());
            for handle in handles {
                let report = handle
                    .await
                    .map_err(|err| PipelineError::Unexpected(err.to_string()))?;
                reports.push(report);
            }
            Ok::<_, AppError>(reports)
        })?;
        Ok(ProcessSummary {
            reports,
            delivered: messenger.delivered(),
        })
    }

    fn graph_preview(&self, args: &GraphArgs) -> Result<GraphPreview> {
        let dimensions = ResolvedDimensions::new(args.width, args.height).ok_or_else(|| {
            AppError::InvalidArgument(format!(
                "frame size {}x{} must be non-zero",
                args.width, args.height
            ))
        })?;
        let image_path = (!args.no_image).then(|| self.config.default_image_path());
        let font_path = FontLocator::new(self.config.text.font_candidates.iter()).locate();
        let assets = WatermarkAssets::from_config(&self.config, image_path, font_path);
        let graph = FilterGraphBuilder::new(&self.config).build(dimensions, &assets);

        let transcoder = Transcoder::new(&self.config.transcode, Arc::new(SystemCommandExecutor));
        let job = TranscodeJob {
            input_path: PathBuf::from("input.mp4"),
            output_path: PathBuf::from("watermarked_input.mp4"),
            graph: graph.clone(),
            audio_present: None,
            metadata: Vec::new(),
        };
        let mut command = vec![transcoder.program().to_string_lossy().to_string()];
        command.extend(transcoder.build_args(&job));
        Ok(GraphPreview {
            dimensions,
            image_width: graph.image_width(),
            font_size: graph.font_size(),
            font_file: assets.font_path,
            filter_complex: graph.render(),
            command,
        })
    }

    fn ensure_assets(&self) -> Result<AssetStatus> {
        let provisioner = AssetProvisioner::new(&self.config)?;
        let available = Self::runtime()?.block_on(provisioner.ensure_default_image_asset());
        Ok(AssetStatus {
            path: provisioner.cache_path().to_path_buf(),
            source: self.config.assets.image_url.clone(),
            available,
        })
    }

    fn effective_config(&self) -> Result<EffectiveConfig> {
        Ok(EffectiveConfig {
            source: self.config_path.clone(),
            toml: self.config.to_toml_string()?,
            config: self.config.clone(),
        })
    }
}

/// Each local file becomes a generic upload, so dimensions are probed.
fn inbound_items(files: &[PathBuf]) -> Result<Vec<InboundItem>> {
    files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let file_ref = if file.is_absolute() {
                file.clone()
            } else {
                std::env::current_dir()?.join(file)
            };
            Ok(InboundItem {
                chat_id: 0,
                message_id: index as i64 + 1,
                file_ref: file_ref.to_string_lossy().to_string(),
                attachment: Attachment::Document(DocumentInfo {
                    file_name: file
                        .file_name()
                        .map(|name| name.to_string_lossy().to_string()),
                    mime_type: None,
                    width: None,
                    height: None,
                }),
            })
        })
        .collect()
}

/// Messenger backed by the local filesystem. Downloads copy `file_ref` into
/// the job directory; uploaded videos are copied into `output_dir`.
#[derive(Debug)]
pub struct LocalMessenger {
    output_dir: PathBuf,
    next_id: AtomicI64,
    delivered: Mutex<Vec<PathBuf>>,
}

impl LocalMessenger {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            next_id: AtomicI64::new(1),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn delivered(&self) -> Vec<PathBuf> {
        self.delivered
            .lock()
            .map(|paths| paths.clone())
            .unwrap_or_default()
    }

    fn next_ref(&self, chat_id: i64) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl Messenger for LocalMessenger {
    async fn download(
        &self,
        item: &InboundItem,
        dest_dir: &Path,
    ) -> MessagingResult<Option<PathBuf>> {
        let source = PathBuf::from(&item.file_ref);
        let Some(name) = source.file_name() else {
            return Ok(None);
        };
        if tokio::fs::metadata(&source).await.is_err() {
            return Ok(None);
        }
        let dest = dest_dir.join(name);
        tokio::fs::copy(&source, &dest)
            .await
            .map_err(|source| MessagingError::Io {
                source,
                path: dest.clone(),
            })?;
        Ok(Some(dest))
    }

    async fn send_text(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> MessagingResult<MessageRef> {
        info!(chat = chat_id, reply_to = ?reply_to, "{text}");
        Ok(self.next_ref(chat_id))
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> MessagingResult<()> {
        info!(chat = message.chat_id, message = message.message_id, "{text}");
        Ok(())
    }

    async fn send_video(
        &self,
        chat_id: i64,
        _reply_to: Option<i64>,
        video: &VideoReply,
    ) -> MessagingResult<MessageRef> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| MessagingError::Io {
                source,
                path: self.output_dir.clone(),
            })?;
        let name = video
            .path
            .file_name()
            .ok_or_else(|| MessagingError::Transport("video has no file name".into()))?;
        let dest = self.output_dir.join(name);
        tokio::fs::copy(&video.path, &dest)
            .await
            .map_err(|source| MessagingError::Io {
                source,
                path: dest.clone(),
            })?;
        info!(
            path = %dest.display(),
            duration = video.duration,
            width = video.width,
            height = video.height,
            caption = %video.caption,
            "video delivered"
        );
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(dest);
        }
        Ok(self.next_ref(chat_id))
    }
}

#[derive(Debug, Serialize)]
struct ProcessSummary {
    reports: Vec<JobReport>,
    delivered: Vec<PathBuf>,
}

impl ProcessSummary {
    fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|report| !report.succeeded())
            .count()
    }
}

impl DisplayFallback for ProcessSummary {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for report in &self.reports {
            let dimensions = report
                .dimensions
                .map(|dims| {
                    if report.dimensions_degraded {
                        format!("{dims} (fallback)")
                    } else {
                        dims.to_string()
                    }
                })
                .unwrap_or_else(|| "-".to_string());
            let mut line = format!(
                "{} | {:?} | dims={} | image={} | font={}",
                report.file_name.as_deref().unwrap_or("<unnamed>"),
                report.state,
                dimensions,
                report.image_applied,
                report
                    .font_size
                    .map(|size| size.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
            if let Some(error) = &report.error {
                line.push_str(&format!(" | error={error}"));
            }
            lines.push(line);
        }
        for path in &self.delivered {
            lines.push(format!("-> {}", path.display()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
struct GraphPreview {
    dimensions: ResolvedDimensions,
    image_width: Option<u32>,
    font_size: Option<u32>,
    font_file: Option<PathBuf>,
    filter_complex: String,
    command: Vec<String>,
}

impl DisplayFallback for GraphPreview {
    fn display(&self) -> String {
        let font = self
            .font_file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<ffmpeg default>".to_string());
        let image = self
            .image_width
            .map(|width| format!("{width}px"))
            .unwrap_or_else(|| "none".to_string());
        [
            format!("Frame: {}", self.dimensions),
            format!("Image mark: {image}"),
            format!(
                "Font: {} @ {}",
                font,
                self.font_size.map(|size| size.to_string()).unwrap_or_default()
            ),
            format!("Filter graph: {}", self.filter_complex),
            format!("Command: {}", self.command.join(" ")),
        ]
        .join("\n")
    }
}

#[derive(Debug, Serialize)]
struct AssetStatus {
    path: PathBuf,
    source: String,
    available: bool,
}

impl DisplayFallback for AssetStatus {
    fn display(&self) -> String {
        if self.available {
            format!("Default watermark image ready at {}", self.path.display())
        } else {
            let source = if self.source.is_empty() {
                "<none>"
            } else {
                &self.source
            };
            format!(
                "Default watermark image unavailable (source: {source}); \
                 jobs will use the text mark only"
            )
        }
    }
}

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    source: PathBuf,
    config: WatermarkConfig,
    #[serde(skip)]
    toml: String,
}

impl DisplayFallback for EffectiveConfig {
    fn display(&self) -> String {
        format!("# effective configuration ({})\n{}", self.source.display(), self.toml)
    }
}
