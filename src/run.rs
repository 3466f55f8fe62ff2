//! The synchronisation loop.
//!
//! ```text
//! Authenticating ──fail──▶ Failed
//!       │
//!       ▼
//! Reconciling ──no inventory, nothing storable──▶ Stalled
//!   │    │   ──empty working set──▶ Converged
//!   │    └──same ids as last pass──▶ Stalled
//!   ▼
//! Downloading ──▶ Reconciling
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::api::RemoteCatalog;
use crate::catalog::Catalog;
use crate::download::Downloader;
use crate::reconcile::reconcile;
use crate::stats::SessionStats;
use crate::transfer::Transfer;

/// States of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Authenticating,
    Reconciling,
    Downloading,
    Converged,
    Stalled,
    Failed,
}

/// Why a run stopped without converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    /// The inventory could not be fetched.
    InventoryUnavailable,
    /// A pass left the set of pending identifiers unchanged.
    Unchanged,
    /// Listed recordings could not be stored in the catalog.
    CatalogRefused,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing is left to download.
    Converged,
    /// Stopped to avoid looping without progress.
    Stalled(StallReason),
    /// The service rejected the credentials.
    InvalidCredentials,
}

impl Outcome {
    /// Terminal state this outcome corresponds to.
    #[must_use]
    pub const fn state(self) -> RunState {
        match self {
            Self::Converged => RunState::Converged,
            Self::Stalled(_) => RunState::Stalled,
            Self::InvalidCredentials => RunState::Failed,
        }
    }

    /// Whether the caller should exit with a failure status.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::InvalidCredentials)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => f.write_str("all recordings retrieved"),
            Self::Stalled(StallReason::InventoryUnavailable) => {
                f.write_str("stopped, the list of recordings is unavailable")
            }
            Self::Stalled(StallReason::Unchanged) => {
                f.write_str("stopped, the last pass made no progress")
            }
            Self::Stalled(StallReason::CatalogRefused) => {
                f.write_str("stopped, the catalog refused listed recordings")
            }
            Self::InvalidCredentials => f.write_str("invalid credentials"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: Outcome,
    /// Reconciliation passes started.
    pub reconciliations: usize,
    /// Download passes performed.
    pub download_passes: usize,
    pub stats: SessionStats,
}

/// Drives reconciliation and downloads until nothing changes any more.
pub struct Agent<'a, R: ?Sized, T: ?Sized> {
    catalog: &'a mut Catalog,
    remote: &'a mut R,
    transfer: &'a T,
    recordings_dir: PathBuf,
    state: RunState,
}

impl<'a, R, T> Agent<'a, R, T>
where
    R: RemoteCatalog + ?Sized,
    T: Transfer + ?Sized,
{
    #[must_use]
    pub fn new(
        catalog: &'a mut Catalog,
        remote: &'a mut R,
        transfer: &'a T,
        recordings_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            remote,
            transfer,
            recordings_dir: recordings_dir.into(),
            state: RunState::Authenticating,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    fn enter(&mut self, state: RunState) {
        log::debug!("{:?} -> {state:?}", self.state);
        self.state = state;
    }

    /// Runs the loop to a terminal state.
    pub async fn run(&mut self) -> RunReport {
        let mut report = RunReport {
            outcome: Outcome::Converged,
            reconciliations: 0,
            download_passes: 0,
            stats: SessionStats::default(),
        };

        if let Err(e) = self.remote.check_credentials().await {
            log::error!("invalid credentials: {e}");
            report.outcome = Outcome::InvalidCredentials;
            self.enter(report.outcome.state());
            return report;
        }

        let mut previous_ids: Option<BTreeSet<String>> = None;
        report.outcome = loop {
            self.enter(RunState::Reconciling);
            report.reconciliations += 1;
            let reconciled = match reconcile(&mut *self.catalog, &mut *self.remote).await {
                Ok(reconciled) => reconciled,
                Err(e) => {
                    log::error!("reconciliation failed: {e}");
                    break Outcome::Stalled(StallReason::InventoryUnavailable);
                }
            };
            if reconciled.working_set.is_empty() {
                if reconciled.skipped > 0 {
                    log::warn!("{} listed recordings could not be stored", reconciled.skipped);
                    break Outcome::Stalled(StallReason::CatalogRefused);
                }
                break Outcome::Converged;
            }

            let current_ids = reconciled.ids();
            if previous_ids.as_ref() == Some(&current_ids) {
                log::warn!(
                    "{} recordings are still pending after another pass, stopping",
                    current_ids.len()
                );
                break Outcome::Stalled(StallReason::Unchanged);
            }

            self.enter(RunState::Downloading);
            report.download_passes += 1;
            let downloader = Downloader::new(self.transfer, self.recordings_dir.clone());
            let stats = downloader
                .download_all(&*self.catalog, &mut *self.remote, &reconciled.working_set)
                .await;
            report.stats.absorb(&stats);
            previous_ids = Some(current_ids);
        };

        self.enter(report.outcome.state());
        log::info!("run finished: {}", report.outcome);
        report
    }
}
