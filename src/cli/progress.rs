//! Progress bar and summary reporting for the command line.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::{CatalogEntry, DownloadState};
use crate::run::RunReport;
use crate::stats::{FileStats, format_bytes, format_duration};
use crate::transfer::TransferProgress;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a progress bar for a single file transfer.
fn make_progress_bar(total: Option<u64>, name: &str) -> ProgressBar {
    let Some(size) = total else {
        let bar = ProgressBar::new_spinner();
        bar.set_message(name.to_string());
        return bar;
    };
    let bar = ProgressBar::new(size);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
    ) {
        bar.set_style(style.progress_chars("━━╌"));
    }
    bar.set_message(name.to_string());
    bar
}

/// [`TransferProgress`] drawing one bar per file on stderr.
#[derive(Default)]
pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(slot) = self.bar.lock()
            && let Some(bar) = slot.as_ref()
        {
            f(bar);
        }
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl TransferProgress for BarProgress {
    fn on_file_start(&self, name: &str, total: Option<u64>, resumed_from: u64) {
        let bar = make_progress_bar(total, name);
        bar.set_position(resumed_from);
        if let Ok(mut slot) = self.bar.lock()
            && let Some(old) = slot.replace(bar)
        {
            old.finish_and_clear();
        }
    }

    fn on_progress(&self, _name: &str, bytes_delta: u64, _speed: u64) {
        self.with_bar(|bar| bar.inc(bytes_delta));
    }

    fn on_file_complete(&self, name: &str, stats: &FileStats) {
        if let Some(bar) = self.take_bar() {
            bar.finish_and_clear();
            bar.println(format!(
                "  {name} - {} in {} ({}/s avg, {}/s peak)",
                format_bytes(stats.size),
                format_duration(stats.elapsed),
                format_bytes(stats.average_speed),
                format_bytes(stats.peak_speed),
            ));
        }
    }

    fn on_error(&self, _name: &str, _error: &str) {
        if let Some(bar) = self.take_bar() {
            bar.abandon();
        }
    }
}

/// Logs the outcome and counters of a run.
pub fn log_summary(report: &RunReport) {
    let stats = &report.stats;
    log::info!("{SEPARATOR}");
    log::info!("Run summary: {}", report.outcome);
    log::info!(
        "  Passes:              {} reconciliation(s), {} download pass(es)",
        report.reconciliations,
        report.download_passes
    );
    log::info!("  Recordings stored:   {}", stats.recordings_downloaded);
    if stats.recordings_failed > 0 {
        log::info!("  Failed attempts:     {}", stats.recordings_failed);
    }
    if stats.thumbnails_failed > 0 {
        log::info!("  Missing thumbnails:  {}", stats.thumbnails_failed);
    }
    if stats.retire_failed > 0 {
        log::info!("  Not deleted remotely: {}", stats.retire_failed);
    }
    if stats.total_bytes > 0 {
        log::info!("  Total size:          {}", format_bytes(stats.total_bytes));
        log::info!("  Total time:          {}", format_duration(stats.elapsed));
        log::info!("  Average speed:       {}/s", format_bytes(stats.average_speed()));
        log::info!("  Peak speed:          {}/s", format_bytes(stats.peak_speed));
    }
    log::info!("{SEPARATOR}");
}

/// Prints the catalog as a table.
pub fn print_catalog(entries: &[CatalogEntry]) {
    if entries.is_empty() {
        println!("The catalog is empty.");
        return;
    }
    println!("{SEPARATOR}");
    println!("{:>6}  {:<10} {:<10} {:<6} {:<19}  Title", "Entry", "Remote", "State", "Listed", "Start");
    println!("{SEPARATOR}");
    for entry in entries {
        let state = match entry.download_state {
            DownloadState::Pending => "pending",
            DownloadState::Downloaded => "downloaded",
        };
        println!(
            "{:>6}  {:<10} {:<10} {:<6} {:<19}  {}",
            entry.id,
            entry.remote_id,
            state,
            if entry.is_listed { "yes" } else { "no" },
            entry.start.as_deref().unwrap_or("-"),
            entry.title
        );
    }
    println!("{SEPARATOR}");
    println!("  {} recording(s)", entries.len());
}
