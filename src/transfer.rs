//! Resumable HTTP file transfers.
//!
//! A file is received into `<name>.part` and renamed once complete, so a
//! final name on disk always means a whole file. An interrupted transfer is
//! continued with a `Range` request on the next attempt or the next run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, HeaderMap, RANGE};
use tokio::io::AsyncWriteExt;

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::stats::{DownloadStatsTracker, FileStats};

/// Trait for receiving transfer progress updates.
///
/// All methods have default no-op implementations.
pub trait TransferProgress: Send + Sync {
    /// Called when bytes start flowing; `total` is the final size if known.
    fn on_file_start(&self, _name: &str, _total: Option<u64>, _resumed_from: u64) {}

    /// Called with the number of bytes received since the last call.
    fn on_progress(&self, _name: &str, _bytes_delta: u64, _speed: u64) {}

    /// Called when a file was stored under its final name.
    fn on_file_complete(&self, _name: &str, _stats: &FileStats) {}

    /// Called when a transfer gives up.
    fn on_error(&self, _name: &str, _error: &str) {}

    /// Called when a `.part` file from an earlier attempt is found.
    fn on_partial_detected(&self, _name: &str, _existing_size: u64) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl TransferProgress for NoProgress {}

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    /// Recordings directory; the subdirectory inherits its ownership.
    pub base_dir: PathBuf,
    pub subdir: String,
    pub file_name: String,
}

impl TransferRequest {
    /// Directory the file lands in.
    #[must_use]
    pub fn target_dir(&self) -> PathBuf {
        self.base_dir.join(&self.subdir)
    }

    /// Final path of the file.
    #[must_use]
    pub fn target(&self) -> PathBuf {
        self.target_dir().join(&self.file_name)
    }
}

/// The transfer engine seam.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Fetches `request.url` to `request.target()`.
    ///
    /// # Errors
    ///
    /// Fails when the target directory cannot be prepared, the server
    /// refuses the file, or all attempts are used up.
    async fn fetch(&self, request: &TransferRequest) -> Result<FileStats>;
}

/// Returns the `.part` path for a final path.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// First byte position of a `Content-Range: bytes <first>-<last>/<total>` reply.
fn content_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let range = value.trim().strip_prefix("bytes")?.trim_start();
    range.split_once('-')?.0.trim().parse().ok()
}

/// Why a single attempt failed.
enum AttemptError {
    /// Worth another attempt (connection trouble, 5xx, short body).
    Retry(Error),
    /// Retrying will not help.
    Fatal(Error),
}

impl AttemptError {
    fn into_inner(self) -> Error {
        match self {
            Self::Retry(e) | Self::Fatal(e) => e,
        }
    }
}

/// [`Transfer`] over HTTP with resume, retry and throttling.
pub struct HttpTransfer<F: FileSystem = TokioFileSystem> {
    client: reqwest::Client,
    config: TransferConfig,
    fs: F,
    progress: Arc<dyn TransferProgress>,
}

impl HttpTransfer<TokioFileSystem> {
    /// Creates a transfer engine on the real file system.
    #[must_use]
    pub fn new(client: reqwest::Client, config: TransferConfig) -> Self {
        Self::with_fs(client, config, TokioFileSystem)
    }
}

impl<F: FileSystem> HttpTransfer<F> {
    /// Creates a transfer engine with a custom file system implementation.
    #[must_use]
    pub fn with_fs(client: reqwest::Client, config: TransferConfig, fs: F) -> Self {
        Self {
            client,
            config,
            fs,
            progress: Arc::new(NoProgress),
        }
    }

    /// Reports progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn TransferProgress>) -> Self {
        self.progress = progress;
        self
    }

    async fn attempt(
        &self,
        request: &TransferRequest,
        target: &Path,
        part: &Path,
    ) -> std::result::Result<FileStats, AttemptError> {
        let name = request.file_name.as_str();
        let resume_from = self.fs.file_size(part).await.unwrap_or(0);

        let mut builder = self.client.get(&request.url);
        if resume_from > 0 {
            self.progress.on_partial_detected(name, resume_from);
            log::info!("resuming {} at byte {resume_from}", target.display());
            builder = builder.header(RANGE, format!("bytes={resume_from}-"));
        }
        let mut response = builder
            .send()
            .await
            .map_err(|e| AttemptError::Retry(e.into()))?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && resume_from > 0 {
            log::info!("{} was already complete", part.display());
            self.finish(request, target, part).await?;
            return Ok(FileStats {
                size: resume_from,
                resumed_from: resume_from,
                ..FileStats::default()
            });
        }
        if !status.is_success() {
            let err = Error::Status {
                status: status.as_u16(),
                url: request.url.clone(),
            };
            return Err(if status.is_server_error() {
                AttemptError::Retry(err)
            } else {
                AttemptError::Fatal(err)
            });
        }

        let append = resume_from > 0 && status == StatusCode::PARTIAL_CONTENT;
        if append {
            let start = content_range_start(response.headers());
            if start != Some(resume_from) {
                self.fs
                    .remove_file(part)
                    .await
                    .map_err(|e| AttemptError::Fatal(e.into()))?;
                return Err(AttemptError::Retry(Error::Transfer(format!(
                    "{name}: asked for byte {resume_from}, server sent range starting at {}",
                    start.map_or_else(|| "an unknown offset".to_string(), |s| s.to_string())
                ))));
            }
        } else if resume_from > 0 {
            log::info!("server ignored the range request, restarting {name}");
        }
        let offset = if append { resume_from } else { 0 };
        let expected = response.content_length().map(|len| len + offset);
        self.progress.on_file_start(name, expected, offset);

        let mut file = self
            .fs
            .open_part(part, append)
            .await
            .map_err(|e| AttemptError::Fatal(e.into()))?;
        let tracker = DownloadStatsTracker::new(offset);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AttemptError::Retry(e.into()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| AttemptError::Fatal(e.into()))?;
            let delta = chunk.len() as u64;
            let speed = tracker.record_bytes(delta);
            self.progress.on_progress(name, delta, speed);
            self.throttle(&tracker).await;
        }
        file.flush().await.map_err(|e| AttemptError::Fatal(e.into()))?;
        drop(file);

        let size = offset + tracker.received();
        if let Some(expected) = expected
            && size != expected
        {
            return Err(AttemptError::Retry(Error::Transfer(format!(
                "{name}: received {size} of {expected} bytes"
            ))));
        }

        self.finish(request, target, part).await?;
        Ok(tracker.into_file_stats())
    }

    /// Moves the part file into place and hands it to the directory owner.
    async fn finish(
        &self,
        request: &TransferRequest,
        target: &Path,
        part: &Path,
    ) -> std::result::Result<(), AttemptError> {
        self.fs
            .rename_file(part, target)
            .await
            .map_err(|e| AttemptError::Fatal(e.into()))?;
        self.adopt(request, target).await.map_err(AttemptError::Fatal)
    }

    /// Gives `target` the owner and mode the recordings directory prescribes.
    async fn adopt(&self, request: &TransferRequest, target: &Path) -> Result<()> {
        self.fs
            .adopt_file(target, &request.base_dir)
            .await
            .map_err(|e| {
                Error::Transfer(format!(
                    "cannot set ownership of {}: {e}",
                    target.display()
                ))
            })
    }

    /// Sleeps as long as needed to stay under the configured rate.
    #[allow(clippy::cast_precision_loss)]
    async fn throttle(&self, tracker: &DownloadStatsTracker) {
        let limit = self.config.max_bytes_per_second;
        if limit == 0 {
            return;
        }
        let due = Duration::from_secs_f64(tracker.received() as f64 / limit as f64);
        if let Some(ahead) = due.checked_sub(tracker.elapsed()) {
            tokio::time::sleep(ahead).await;
        }
    }
}

#[async_trait]
impl<F: FileSystem> Transfer for HttpTransfer<F> {
    async fn fetch(&self, request: &TransferRequest) -> Result<FileStats> {
        let dir = request.target_dir();
        self.fs
            .ensure_dir(&dir, &request.base_dir)
            .await
            .map_err(|e| Error::Transfer(format!("cannot prepare {}: {e}", dir.display())))?;

        let target = request.target();
        let part = part_path(&target);
        if !self.fs.file_exists(&part).await
            && let Some(size) = self.fs.file_size(&target).await
        {
            log::info!("{} is already present", target.display());
            self.adopt(request, &target).await?;
            return Ok(FileStats {
                size,
                resumed_from: size,
                ..FileStats::default()
            });
        }

        log::info!("downloading {} to {}", request.url, target.display());
        let attempts = self.config.retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.attempt(request, &target, &part).await {
                Ok(stats) => {
                    self.progress.on_file_complete(&request.file_name, &stats);
                    return Ok(stats);
                }
                Err(AttemptError::Retry(e)) if attempt < attempts => {
                    log::warn!("attempt {attempt}/{attempts} for {} failed: {e}", request.url);
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(e) => {
                    let e = e.into_inner();
                    self.progress.on_error(&request.file_name, &e.to_string());
                    return Err(e);
                }
            }
        }
    }
}
