//! Logger setup.
//!
//! With a log file configured, records go to that file, which is rotated by
//! size, and errors are repeated on stderr.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use env_logger::{Builder, Env, Target};
use log::{Level, LevelFilter};

use crate::error::Result;

/// Environment variable overriding the configured level.
pub const LOG_ENV: &str = "BONG_LOG";

/// Size at which the log file is rotated.
pub const MAX_LOG_BYTES: u64 = 10_000_000;

/// Rotated files kept next to the log file (`.1` is the newest).
pub const LOG_BACKUPS: usize = 3;

/// Level used when [`LOG_ENV`] is not set.
#[must_use]
pub const fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Append-only log file that moves itself aside once it grows too large.
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    size: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    /// Opens `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
            max_bytes,
            backups,
        })
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups > 0 {
            for n in (1..self.backups).rev() {
                let from = self.backup_path(n);
                if from.exists() {
                    std::fs::rename(&from, self.backup_path(n + 1))?;
                }
            }
            std::fs::rename(&self.path, self.backup_path(1))?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.size > 0 && self.size + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Builds the logger writing to `log_file`, or stderr when `None`.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened for appending.
pub fn builder(verbose: bool, log_file: Option<&Path>) -> Result<Builder> {
    let env = Env::default().filter_or(LOG_ENV, default_level(verbose).as_str());
    let mut builder = Builder::from_env(env);
    builder.format_timestamp_secs();
    if let Some(path) = log_file {
        let file = RotatingFile::open(path, MAX_LOG_BYTES, LOG_BACKUPS)?;
        builder.target(Target::Pipe(Box::new(file)));
        builder.write_style(env_logger::WriteStyle::Never);
        builder.format(|buf, record| {
            if record.level() == Level::Error {
                eprintln!("Error: {}", record.args());
            }
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                buf.timestamp_seconds(),
                record.level(),
                record.target(),
                record.args()
            )
        });
    } else {
        builder.target(Target::Stderr);
    }
    Ok(builder)
}

/// Installs the global logger. Later calls are ignored.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    if builder(verbose, log_file)?.try_init().is_err() {
        log::debug!("logger already initialised");
    }
    Ok(())
}
