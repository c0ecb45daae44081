pub mod assets;
pub mod classify;
pub mod command;
pub mod config;
pub mod error;
pub mod fallback;
pub mod filter_graph;
pub mod fonts;
pub mod messaging;
pub mod pipeline;
pub mod probe;
pub mod resolver;
pub mod transcode;
pub mod types;

pub use assets::{AssetError, AssetProvisioner, AssetResult};
pub use classify::{classify, InboundMediaRef, MediaKind, SUPPORTED_EXTENSIONS};
pub use command::{CommandExecutor, SystemCommandExecutor};
pub use config::{
    load_watermark_config, load_watermark_config_or_default, AssetsSection, ImageSection,
    PathsSection, ProbeSection, RepliesSection, TextSection, TranscodeSection, WatermarkConfig,
};
pub use error::{ConfigError, Result};
pub use fallback::Fallback;
pub use filter_graph::{
    DrawText, FilterGraphBuilder, FilterGraphSpec, FilterStage, VIDEO_OUTPUT_LABEL,
};
pub use fonts::FontLocator;
pub use messaging::{
    Attachment, DocumentInfo, InboundItem, MessageRef, Messenger, MessagingError,
    MessagingResult, StatusMessage, VideoInfo, VideoReply,
};
pub use pipeline::{
    JobArtifacts, JobObserver, JobReport, JobState, PipelineError, PipelineResult,
    TracingObserver, WatermarkPipeline,
};
pub use probe::{MediaProber, MediaSummary, ProbeError, ProbeResult};
pub use resolver::{DimensionResolver, Resolution};
pub use transcode::{TranscodeError, TranscodeJob, TranscodeResult, Transcoder};
pub use types::{OutputMetadata, ResolvedDimensions, WatermarkAssets};
