//! File system abstraction for testability.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Abstraction over the file system operations used by transfers.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Checks if a file exists at the given path.
    async fn file_exists(&self, path: &Path) -> bool;

    /// Returns the size of a file if it exists.
    async fn file_size(&self, path: &Path) -> Option<u64>;

    /// Creates `path` if absent and gives it the owner, group and mode of
    /// `template`, also when it already existed.
    async fn ensure_dir(&self, path: &Path, template: &Path) -> std::io::Result<()>;

    /// Opens a partial file for writing, appending or truncating.
    async fn open_part(&self, path: &Path, append: bool) -> std::io::Result<tokio::fs::File>;

    /// Renames a file.
    async fn rename_file(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    /// Removes a file.
    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;

    /// Gives a finished file the owner and group of `template` and its
    /// mode without execute bits.
    async fn adopt_file(&self, path: &Path, template: &Path) -> std::io::Result<()>;
}

/// Default file system implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new `TokioFileSystem` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn file_size(&self, path: &Path) -> Option<u64> {
        tokio::fs::metadata(path).await.ok().map(|m| m.len())
    }

    async fn ensure_dir(&self, path: &Path, template: &Path) -> std::io::Result<()> {
        if !tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
            tokio::fs::create_dir_all(path).await?;
            log::debug!("created directory {}", path.display());
        }
        copy_ownership(path.to_path_buf(), template.to_path_buf(), 0o7777).await
    }

    async fn open_part(&self, path: &Path, append: bool) -> std::io::Result<tokio::fs::File> {
        let mut options = tokio::fs::OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        options.open(path).await
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn adopt_file(&self, path: &Path, template: &Path) -> std::io::Result<()> {
        copy_ownership(path.to_path_buf(), template.to_path_buf(), 0o666).await
    }
}

/// Copies uid, gid and `mask`ed permission bits of `template` onto `path`.
async fn copy_ownership(path: PathBuf, template: PathBuf, mask: u32) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || apply_ownership(&path, &template, mask))
        .await
        .map_err(std::io::Error::other)?
}

#[cfg(unix)]
fn apply_ownership(path: &Path, template: &Path, mask: u32) -> std::io::Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let wanted = std::fs::metadata(template)?;
    let current = std::fs::metadata(path)?;
    if (current.uid(), current.gid()) != (wanted.uid(), wanted.gid()) {
        std::os::unix::fs::chown(path, Some(wanted.uid()), Some(wanted.gid()))?;
    }
    let mode = wanted.mode() & mask;
    if current.mode() & 0o7777 != mode {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_ownership(_path: &Path, _template: &Path, _mask: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn tokio_fs_file_exists_and_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hello").unwrap();

        let fs = TokioFileSystem::new();
        assert!(fs.file_exists(&path).await);
        assert_eq!(fs.file_size(&path).await, Some(5));
        assert!(!fs.file_exists(&dir.path().join("nonexistent.txt")).await);
        assert_eq!(fs.file_size(&dir.path().join("nonexistent.txt")).await, None);
    }

    #[tokio::test]
    async fn open_part_appends_or_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("video.mp4.part");
        let fs = TokioFileSystem::new();

        let mut file = fs.open_part(&path, true).await.unwrap();
        file.write_all(b"abc").await.unwrap();
        file.flush().await.unwrap();
        let mut file = fs.open_part(&path, true).await.unwrap();
        file.write_all(b"def").await.unwrap();
        file.flush().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");

        let mut file = fs.open_part(&path, false).await.unwrap();
        file.write_all(b"x").await.unwrap();
        file.flush().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"x");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ensure_dir_copies_template_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o750)).unwrap();
        let target = dir.path().join("bong000001");

        let fs = TokioFileSystem::new();
        fs.ensure_dir(&target, dir.path()).await.unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o750);

        // An existing directory is brought back in line.
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o700)).unwrap();
        fs.ensure_dir(&target, dir.path()).await.unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o750);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn adopt_file_drops_execute_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o775)).unwrap();
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"data").unwrap();

        TokioFileSystem::new().adopt_file(&path, dir.path()).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o664);
    }

    #[tokio::test]
    async fn ensure_dir_fails_below_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let fs = TokioFileSystem::new();
        assert!(fs.ensure_dir(&blocker.join("sub"), dir.path()).await.is_err());
    }
}
