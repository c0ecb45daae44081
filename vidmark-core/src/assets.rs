use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

use crate::config::WatermarkConfig;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid asset url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("fetched asset is not a decodable image: {0}")]
    InvalidImage(String),
}

impl From<reqwest::Error> for AssetError {
    fn from(error: reqwest::Error) -> Self {
        AssetError::Network(error.to_string())
    }
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Keeps the default image mark cached on disk, fetching it at most once per
/// missing cache file.
#[derive(Clone)]
pub struct AssetProvisioner {
    client: Client,
    source_url: String,
    cache_path: PathBuf,
}

impl AssetProvisioner {
    pub fn new(config: &WatermarkConfig) -> AssetResult<Self> {
        let client = Client::builder()
            .user_agent("vidmark/0.1")
            .timeout(config.assets.fetch_timeout())
            .build()?;
        Ok(Self {
            client,
            source_url: config.assets.image_url.trim().to_string(),
            cache_path: config.default_image_path(),
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// `true` when the cached image is usable. Failures are logged and leave
    /// no partial file behind.
    pub async fn ensure_default_image_asset(&self) -> bool {
        if fs::metadata(&self.cache_path).await.is_ok() {
            return true;
        }
        if self.source_url.is_empty() {
            info!("no default image configured, continuing with text mark only");
            return false;
        }
        let partial = self.partial_path();
        match self.fetch_into_cache(&partial).await {
            Ok(()) => {
                info!(
                    path = %self.cache_path.display(),
                    url = %self.source_url,
                    "cached default watermark image"
                );
                true
            }
            Err(err) => {
                error!(
                    url = %self.source_url,
                    error = %err,
                    "failed to fetch default watermark image"
                );
                if let Err(remove) = fs::remove_file(&partial).await {
                    if remove.kind() != std::io::ErrorKind::NotFound {
                        error!(
                            path = %partial.display(),
                            error = %remove,
                            "failed to remove partial download"
                        );
                    }
                }
                false
            }
        }
    }

    /// Each fetch writes its own file so concurrent jobs never observe a
    /// half-written cache entry.
    fn partial_path(&self) -> PathBuf {
        let name = self
            .cache_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "watermark".into());
        self.cache_path
            .with_file_name(format!(".{name}.part-{}", Uuid::new_v4()))
    }

    async fn fetch_into_cache(&self, partial: &Path) -> AssetResult<()> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| AssetError::Io {
                    source,
                    path: parent.to_path_buf(),
                })?;
        }
        self.fetch_to_file(partial).await?;
        validate_image(partial).await?;
        fs::rename(partial, &self.cache_path)
            .await
            .map_err(|source| AssetError::Io {
                source,
                path: self.cache_path.clone(),
            })
    }

    async fn fetch_to_file(&self, path: &Path) -> AssetResult<()> {
        let url = Url::parse(&self.source_url).map_err(|err| AssetError::InvalidUrl {
            url: self.source_url.clone(),
            reason: err.to_string(),
        })?;
        if url.scheme() == "file" {
            let source_path = url.to_file_path().map_err(|_| AssetError::InvalidUrl {
                url: self.source_url.clone(),
                reason: "not a local path".into(),
            })?;
            fs::copy(&source_path, path)
                .await
                .map_err(|source| AssetError::Io {
                    source,
                    path: source_path.clone(),
                })?;
            return Ok(());
        }

        let response = self.client.get(url).send().await?.error_for_status()?;
        let mut stream = response.bytes_stream();
        let mut file = fs::File::create(path)
            .await
            .map_err(|source| AssetError::Io {
                source,
                path: path.to_path_buf(),
            })?;
        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            file.write_all(&data)
                .await
                .map_err(|source| AssetError::Io {
                    source,
                    path: path.to_path_buf(),
                })?;
        }
        file.flush().await.map_err(|source| AssetError::Io {
            source,
            path: path.to_path_buf(),
        })
    }
}

async fn validate_image(path: &Path) -> AssetResult<()> {
    let owned = path.to_path_buf();
    let decoded = tokio::task::spawn_blocking(move || -> Result<(u32, u32), String> {
        image::io::Reader::open(&owned)
            .map_err(|err| err.to_string())?
            .with_guessed_format()
            .map_err(|err| err.to_string())?
            .into_dimensions()
            .map_err(|err| err.to_string())
    })
    .await
    .map_err(|err| AssetError::InvalidImage(err.to_string()))?;
    match decoded {
        Ok((width, height)) if width > 0 && height > 0 => Ok(()),
        Ok(_) => Err(AssetError::InvalidImage("image has zero size".into())),
        Err(reason) => Err(AssetError::InvalidImage(reason)),
    }
}
