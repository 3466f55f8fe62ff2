//! Merging the remote inventory into the local catalog.

use std::collections::{BTreeMap, BTreeSet};

use crate::api::RemoteCatalog;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::record::RecordingRecord;

/// A recording eligible for download in the current pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Local catalog identifier; names the target directory.
    pub entry_id: i64,
    pub record: RecordingRecord,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct Reconciled {
    /// Listed, not yet downloaded recordings keyed by remote identifier.
    pub working_set: BTreeMap<String, WorkItem>,
    /// Number of recordings the service listed.
    pub remote_count: usize,
    /// Listed recordings that were downloaded before.
    pub already_downloaded: usize,
    /// Listed recordings the catalog refused.
    pub skipped: usize,
}

impl Reconciled {
    /// Whether the service listed any recording at all.
    #[must_use]
    pub const fn had_remote_records(&self) -> bool {
        self.remote_count > 0
    }

    /// Remote identifiers of the working set.
    #[must_use]
    pub fn ids(&self) -> BTreeSet<String> {
        self.working_set.keys().cloned().collect()
    }
}

/// Runs one reconciliation pass.
///
/// # Errors
///
/// Fails when the listed flags cannot be reset or the inventory cannot be
/// fetched. Failures for single recordings are logged and skipped.
pub async fn reconcile<R>(catalog: &mut Catalog, remote: &mut R) -> Result<Reconciled>
where
    R: RemoteCatalog + ?Sized,
{
    catalog.mark_all_unlisted()?;
    let inventory = remote.fetch_inventory().await?;

    let mut reconciled = Reconciled {
        remote_count: inventory.len(),
        ..Reconciled::default()
    };
    for (id, record) in inventory {
        match catalog.upsert(&record) {
            Ok(upsert) if upsert.already_downloaded => {
                log::info!("recording {id} ({}) was already retrieved", record.title);
                reconciled.already_downloaded += 1;
            }
            Ok(upsert) => {
                if upsert.inserted {
                    log::info!("new recording {id}: {}", record.title);
                }
                reconciled.working_set.insert(
                    id,
                    WorkItem {
                        entry_id: upsert.entry_id,
                        record,
                    },
                );
            }
            Err(e) => {
                log::error!("cannot store recording {id}: {e}");
                reconciled.skipped += 1;
            }
        }
    }

    log::info!(
        "{} recordings listed, {} to download, {} already retrieved",
        reconciled.remote_count,
        reconciled.working_set.len(),
        reconciled.already_downloaded
    );
    Ok(reconciled)
}
