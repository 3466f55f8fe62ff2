//! Downloading the working set.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::api::RemoteCatalog;
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::reconcile::WorkItem;
use crate::record::{IMAGE_BASE_NAME, VIDEO_BASE_NAME, asset_file_name, entry_dir_name};
use crate::stats::{SessionStats, SessionStatsBuilder};
use crate::transfer::{Transfer, TransferRequest};

/// Downloads recordings one at a time and commits each success.
pub struct Downloader<'a, T: Transfer + ?Sized> {
    transfer: &'a T,
    recordings_dir: PathBuf,
}

impl<'a, T: Transfer + ?Sized> Downloader<'a, T> {
    /// Creates a downloader storing into `recordings_dir`.
    #[must_use]
    pub fn new(transfer: &'a T, recordings_dir: impl Into<PathBuf>) -> Self {
        Self {
            transfer,
            recordings_dir: recordings_dir.into(),
        }
    }

    fn request(&self, item: &WorkItem, url: &str, base_name: &str) -> TransferRequest {
        TransferRequest {
            url: url.to_string(),
            base_dir: self.recordings_dir.clone(),
            subdir: entry_dir_name(item.entry_id),
            file_name: asset_file_name(url, base_name),
        }
    }

    /// Processes a single recording.
    ///
    /// The primary file is fetched first; only once it is stored is the
    /// thumbnail attempted, the entry marked downloaded and the remote copy
    /// retired. Thumbnail and retire failures are counted, not returned.
    ///
    /// # Errors
    ///
    /// Returns an error when the primary transfer fails or the catalog
    /// cannot record the download. The remote copy is kept in both cases.
    pub async fn download_recording<R>(
        &self,
        catalog: &Catalog,
        remote: &mut R,
        item: &WorkItem,
        stats: &mut SessionStatsBuilder,
    ) -> Result<()>
    where
        R: RemoteCatalog + ?Sized,
    {
        let record = &item.record;
        let url = record.primary_url().ok_or_else(|| {
            Error::Transfer(format!("recording {} has no download URL", record.id))
        })?;

        let video = self.request(item, url, VIDEO_BASE_NAME);
        let file_stats = self.transfer.fetch(&video).await?;
        stats.add_file(&file_stats);
        log::info!("stored {} as {}", record.title, video.target().display());

        if let Some(image_url) = record.thumbnail_url() {
            let image = self.request(item, image_url, IMAGE_BASE_NAME);
            match self.transfer.fetch(&image).await {
                Ok(file_stats) => stats.add_file(&file_stats),
                Err(e) => {
                    log::warn!("thumbnail for recording {} not stored: {e}", record.id);
                    stats.add_thumbnail_failure();
                }
            }
        }

        if !catalog.mark_downloaded(&record.id)? {
            return Err(Error::Protocol(format!(
                "recording {} is not in the catalog",
                record.id
            )));
        }
        stats.add_recording();

        if let Err(e) = remote.retire_recording(&record.id).await {
            log::warn!("recording {} could not be deleted remotely: {e}", record.id);
            stats.add_retire_failure();
        } else {
            log::info!("recording {} deleted remotely", record.id);
        }
        Ok(())
    }

    /// Processes the whole working set in identifier order.
    ///
    /// Failed recordings stay pending for a later pass.
    pub async fn download_all<R>(
        &self,
        catalog: &Catalog,
        remote: &mut R,
        working_set: &BTreeMap<String, WorkItem>,
    ) -> SessionStats
    where
        R: RemoteCatalog + ?Sized,
    {
        let mut stats = SessionStatsBuilder::new();
        for (id, item) in working_set {
            if let Err(e) = self.download_recording(catalog, remote, item, &mut stats).await {
                log::error!("download of recording {id} failed: {e}");
                stats.add_failure();
            }
        }
        stats.build()
    }
}
