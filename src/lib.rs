//! bong-dl - downloads recordings from the bong.tv online video recorder.
//!
//! The service keeps recorded shows for a while; this library mirrors them
//! into a local directory. Each run reconciles the remote list of
//! recordings with a local SQLite catalog, downloads whatever is new,
//! marks it downloaded and deletes it on the service. The loop repeats
//! until the service has nothing left to offer or a pass makes no progress.
//!
//! # Example
//!
//! ```no_run
//! use bong_dl::{
//!     Agent, AppConfig, Catalog, HttpTransfer, ReqwestTransport, ResponseCache, ServiceClient,
//!     build_http_client,
//! };
//!
//! # async fn example() -> bong_dl::Result<()> {
//! let config = AppConfig::load(&AppConfig::default_path())?;
//! config.validate()?;
//!
//! let http = build_http_client(&config.transfer.user_agent, config.transfer.timeout())?;
//! let cache = ResponseCache::new(&config.paths.data_dir, config.options.cache_lifespan());
//! let mut remote = ServiceClient::new(ReqwestTransport::new(http.clone()), &config.service, cache);
//! let transfer = HttpTransfer::new(http, config.transfer.clone());
//! let mut catalog = Catalog::open(&config.paths.database())?;
//!
//! let report = Agent::new(&mut catalog, &mut remote, &transfer, &config.paths.recordings_dir)
//!     .run()
//!     .await;
//! println!("{}: {} recordings stored", report.outcome, report.stats.recordings_downloaded);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod api;
pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod fs;
pub mod logging;
pub mod reconcile;
pub mod record;
pub mod run;
pub mod singleton;
pub mod stats;
pub mod transfer;

#[cfg(test)]
mod testutil;

// Re-export main types for convenience
pub use api::{
    Inventory, RemoteCatalog, ReqwestTransport, ResponseCache, ServiceClient, Transport,
    build_http_client,
};
pub use catalog::{Catalog, CatalogEntry, CatalogError, DownloadState};
pub use config::{AppConfig, TransferConfig};
pub use download::Downloader;
pub use error::{Error, Result};
pub use fs::{FileSystem, TokioFileSystem};
pub use reconcile::{Reconciled, WorkItem, reconcile};
pub use record::RecordingRecord;
pub use run::{Agent, Outcome, RunReport, RunState, StallReason};
pub use singleton::InstanceGuard;
pub use stats::{FileStats, SessionStats, format_bytes, format_duration};
pub use transfer::{HttpTransfer, NoProgress, Transfer, TransferProgress, TransferRequest};
