use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Temporary files owned by one job. Removed by [`JobArtifacts::cleanup`], or
/// synchronously on drop if the job task never got that far.
#[derive(Debug)]
pub struct JobArtifacts {
    job_dir: PathBuf,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    cleaned: bool,
}

impl JobArtifacts {
    pub async fn create(work_dir: &Path, job_id: Uuid) -> std::io::Result<Self> {
        let job_dir = work_dir.join(job_id.to_string());
        fs::create_dir_all(&job_dir).await?;
        Ok(Self {
            job_dir,
            input: None,
            output: None,
            cleaned: false,
        })
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn track_input(&mut self, path: PathBuf) {
        self.input = Some(path);
    }

    /// Reserves `watermarked_<base>.mp4` next to the input.
    pub fn reserve_output(&mut self, input: &Path) -> PathBuf {
        let base = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".into());
        let path = self.job_dir.join(format!("watermarked_{base}.mp4"));
        self.output = Some(path.clone());
        path
    }

    /// Removes every tracked file and the job directory. Failures are logged.
    /// Returns the paths that were removed.
    pub async fn cleanup(&mut self) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        for path in self.tracked() {
            match fs::remove_file(&path).await {
                Ok(()) => removed.push(path),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove temp file")
                }
            }
        }
        if let Err(err) = fs::remove_dir_all(&self.job_dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    path = %self.job_dir.display(),
                    error = %err,
                    "failed to remove job directory"
                );
            }
        }
        self.cleaned = true;
        debug!(
            job_dir = %self.job_dir.display(),
            removed = removed.len(),
            "job artifacts cleaned"
        );
        removed
    }

    fn tracked(&self) -> Vec<PathBuf> {
        self.input.iter().chain(self.output.iter()).cloned().collect()
    }
}

impl Drop for JobArtifacts {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        for path in self.tracked() {
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to remove temp file on drop"
                    );
                }
            }
        }
        if let Err(err) = std::fs::remove_dir_all(&self.job_dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    path = %self.job_dir.display(),
                    error = %err,
                    "failed to remove job directory on drop"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn cleanup_removes_tracked_files_and_directory() {
        let work = TempDir::new().unwrap();
        let mut artifacts = JobArtifacts::create(work.path(), Uuid::new_v4()).await.unwrap();
        let input = artifacts.job_dir().join("clip.mkv");
        std::fs::write(&input, b"in").unwrap();
        artifacts.track_input(input.clone());
        let output = artifacts.reserve_output(&input);
        assert_eq!(output.file_name().unwrap(), "watermarked_clip.mp4");
        std::fs::write(&output, b"out").unwrap();

        let removed = artifacts.cleanup().await;
        assert_eq!(removed, vec![input.clone(), output.clone()]);
        assert!(!input.exists());
        assert!(!output.exists());
        assert!(!artifacts.job_dir().exists());
    }

    #[tokio::test]
    async fn missing_files_are_not_errors() {
        let work = TempDir::new().unwrap();
        let mut artifacts = JobArtifacts::create(work.path(), Uuid::new_v4()).await.unwrap();
        let input = artifacts.job_dir().join("never-written.mp4");
        artifacts.track_input(input.clone());
        artifacts.reserve_output(&input);
        assert!(artifacts.cleanup().await.is_empty());
    }

    #[tokio::test]
    async fn drop_cleans_up_abandoned_jobs() {
        let work = TempDir::new().unwrap();
        let job_dir;
        {
            let mut artifacts = JobArtifacts::create(work.path(), Uuid::new_v4()).await.unwrap();
            let input = artifacts.job_dir().join("clip.mp4");
            std::fs::write(&input, b"in").unwrap();
            artifacts.track_input(input);
            job_dir = artifacts.job_dir().to_path_buf();
        }
        assert!(!job_dir.exists());
    }
}
