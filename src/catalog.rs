//! Local catalog of recordings, stored in SQLite.
//!
//! Every logical operation is committed on its own so an interrupted run
//! leaves the catalog consistent. Entries are never deleted.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use thiserror::Error;

use crate::record::RecordingRecord;

/// Catalog failures, split by whether retrying could ever help.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A uniqueness or NOT NULL rule rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self {
        if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
            Self::Constraint(e.to_string())
        } else {
            Self::Database(e)
        }
    }
}

/// Download state as stored in the `download_state` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Pending = 1,
    Downloaded = 0,
}

impl DownloadState {
    const fn from_code(code: i64) -> Self {
        if code == Self::Downloaded as i64 {
            Self::Downloaded
        } else {
            Self::Pending
        }
    }
}

/// A persisted recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: i64,
    pub remote_id: String,
    pub is_listed: bool,
    pub download_state: DownloadState,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub genre: String,
    pub channel: String,
    /// `YYYY-MM-DD HH:MM:SS`, `None` if the service sent something else.
    pub start: Option<String>,
    /// `HH:MM:SS`, `None` if the service sent something else.
    pub duration: Option<String>,
    pub series_season: String,
    pub series_number: String,
    pub series_count: String,
    pub image_name: String,
    pub image_url: String,
    pub download_hq: String,
    pub download_nq: Option<String>,
}

impl CatalogEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            remote_id: row.get("remote_id")?,
            is_listed: row.get("is_listed")?,
            download_state: DownloadState::from_code(row.get("download_state")?),
            title: row.get("title")?,
            subtitle: row.get("subtitle")?,
            description: row.get("description")?,
            genre: row.get("genre")?,
            channel: row.get("channel")?,
            start: row.get("start")?,
            duration: row.get("duration")?,
            series_season: row.get("series_season")?,
            series_number: row.get("series_number")?,
            series_count: row.get("series_count")?,
            image_name: row.get("image_name")?,
            image_url: row.get("image")?,
            download_hq: row.get("download_hq")?,
            download_nq: row.get("download_nq")?,
        })
    }
}

/// Result of [`Catalog::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upsert {
    /// Local identifier of the entry.
    pub entry_id: i64,
    /// Whether the entry had been downloaded in an earlier pass or run.
    pub already_downloaded: bool,
    /// Whether the entry was created by this call.
    pub inserted: bool,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS recording (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id       TEXT NOT NULL UNIQUE,
    is_listed       INTEGER NOT NULL DEFAULT 1,
    download_state  INTEGER NOT NULL DEFAULT 1,
    title           TEXT NOT NULL,
    subtitle        TEXT NOT NULL,
    description     TEXT NOT NULL,
    genre           TEXT NOT NULL,
    channel         TEXT NOT NULL,
    start           TEXT,
    duration        TEXT,
    series_season   TEXT NOT NULL,
    series_number   TEXT NOT NULL,
    series_count    TEXT NOT NULL,
    image_name      TEXT NOT NULL,
    image           TEXT NOT NULL,
    download_hq     TEXT NOT NULL,
    download_nq     TEXT
);
CREATE INDEX IF NOT EXISTS idx_recording_state ON recording(download_state);
";

/// The local catalog.
pub struct Catalog {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Opens the catalog at `path`, creating file and schema when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialised.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let created = !path.exists();
        let conn = Connection::open(path)?;
        let catalog = Self::init(conn, Some(path.to_path_buf()))?;
        if created {
            log::info!("created catalog {}", path.display());
        }
        Ok(catalog)
    }

    /// Opens a throwaway catalog in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, CatalogError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path })
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> rusqlite::Result<()> {
        self.conn.execute_batch(sql)
    }

    /// Database file, `None` for in-memory catalogs.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Clears the listed flag of every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_all_unlisted(&self) -> Result<usize, CatalogError> {
        Ok(self
            .conn
            .execute("UPDATE recording SET is_listed = 0", [])?)
    }

    /// Re-lists the entry for `record`, creating it on first sighting.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Constraint`] when the row is rejected and
    /// [`CatalogError::Database`] for other failures.
    pub fn upsert(&mut self, record: &RecordingRecord) -> Result<Upsert, CatalogError> {
        let tx = self.conn.transaction()?;
        let existing: Option<(i64, i64)> = tx
            .query_row(
                "SELECT id, download_state FROM recording WHERE remote_id = ?1",
                [&record.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let upsert = match existing {
            Some((entry_id, state)) => {
                tx.execute("UPDATE recording SET is_listed = 1 WHERE id = ?1", [entry_id])?;
                Upsert {
                    entry_id,
                    already_downloaded: DownloadState::from_code(state) == DownloadState::Downloaded,
                    inserted: false,
                }
            }
            None => Upsert {
                entry_id: insert(&tx, record)?,
                already_downloaded: false,
                inserted: true,
            },
        };
        tx.commit()?;
        Ok(upsert)
    }

    /// Marks the entry for `remote_id` as downloaded.
    ///
    /// Returns whether an entry matched. Repeating the call is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_downloaded(&self, remote_id: &str) -> Result<bool, CatalogError> {
        let changed = self.conn.execute(
            "UPDATE recording SET download_state = ?1 WHERE remote_id = ?2",
            params![DownloadState::Downloaded as i64, remote_id],
        )?;
        Ok(changed > 0)
    }

    /// Looks up an entry by remote identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn entry(&self, remote_id: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM recording WHERE remote_id = ?1",
                [remote_id],
                CatalogEntry::from_row,
            )
            .optional()?)
    }

    /// All entries ordered by local identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut stmt = self.conn.prepare("SELECT * FROM recording ORDER BY id")?;
        let rows = stmt.query_map([], CatalogEntry::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Inserts a new, listed, pending entry and returns its local identifier.
fn insert(conn: &Connection, record: &RecordingRecord) -> Result<i64, CatalogError> {
    let start = record.normalized_start();
    if start.is_none() {
        log::warn!(
            "recording {}: cannot interpret start time {:?}",
            record.id,
            record.start
        );
    }
    let duration = record.normalized_duration();
    if duration.is_none() {
        log::warn!(
            "recording {}: cannot interpret duration {:?}",
            record.id,
            record.duration
        );
    }

    conn.execute(
        "INSERT INTO recording (
            remote_id, is_listed, download_state, title, subtitle, description,
            genre, channel, start, duration, series_season, series_number,
            series_count, image_name, image, download_hq, download_nq
        ) VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            record.id,
            DownloadState::Pending as i64,
            record.title,
            record.subtitle,
            record.description,
            record.genre,
            record.channel,
            start,
            duration,
            record.series_season,
            record.series_number,
            record.series_count,
            record.image_name,
            record.image_url,
            record.download_hq,
            record.download_nq,
        ],
    )?;
    let entry_id = conn.last_insert_rowid();
    log::debug!("recording {} stored as entry {entry_id}", record.id);
    Ok(entry_id)
}
