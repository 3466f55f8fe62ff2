//! File-backed cache of raw service replies.
//!
//! The cache is a pure optimisation: files are plain overwrites and a
//! stale, missing or unreadable file simply means "ask the service".

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Which query a cached reply belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Reply of the recordings listing.
    Recordings,
    /// Reply of the credentials check.
    Credentials,
}

impl CacheKind {
    /// File name of the cache file for this kind.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Recordings => "getRecordings.cache",
            Self::Credentials => "checkCredentials.cache",
        }
    }
}

/// Reply cache living in the data directory.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    lifespan: Duration,
}

impl ResponseCache {
    /// Creates a cache in `dir`; a zero `lifespan` disables it.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, lifespan: Duration) -> Self {
        Self {
            dir: dir.into(),
            lifespan,
        }
    }

    /// Path of the cache file for `kind`.
    #[must_use]
    pub fn path(&self, kind: CacheKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Returns the cached reply if it was written less than `lifespan` ago.
    pub async fn fresh(&self, kind: CacheKind) -> Option<String> {
        if self.lifespan.is_zero() {
            return None;
        }
        let path = self.path(kind);
        let modified = tokio::fs::metadata(&path).await.ok()?.modified().ok()?;
        // A modification time in the future counts as fresh.
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= self.lifespan {
            log::debug!("cached {} is {}s old, ignoring", kind.file_name(), age.as_secs());
            return None;
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => Some(body),
            Err(e) => {
                log::warn!("cannot read cache file {}: {e}", path.display());
                None
            }
        }
    }

    /// Stores a reply; failures are logged and otherwise ignored.
    pub async fn store(&self, kind: CacheKind, body: &str) {
        if self.lifespan.is_zero() {
            return;
        }
        let path = self.path(kind);
        if let Err(e) = tokio::fs::write(&path, body).await {
            log::warn!("cannot write cache file {}: {e}", path.display());
        }
    }

    /// Removes the cached reply so the next lookup goes to the service.
    pub async fn invalidate(&self, kind: CacheKind) {
        remove_if_exists(&self.path(kind)).await;
    }
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("removed cache file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("cannot remove cache file {}: {e}", path.display()),
    }
}
