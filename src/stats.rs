//! Transfer and session statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Statistics for a single file transfer.
#[derive(Debug, Clone, Default)]
pub struct FileStats {
    /// Size of the finished file in bytes.
    pub size: u64,
    /// Bytes that were already present from an interrupted attempt.
    pub resumed_from: u64,
    /// Time spent on the transfer.
    pub elapsed: Duration,
    /// Average speed over the transferred bytes.
    pub average_speed: u64,
    /// Peak speed in bytes per second.
    pub peak_speed: u64,
}

impl FileStats {
    /// Bytes actually moved over the network.
    #[must_use]
    pub const fn transferred(&self) -> u64 {
        self.size.saturating_sub(self.resumed_from)
    }
}

/// Outcome counters for one or more download passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Recordings stored locally and marked downloaded.
    pub recordings_downloaded: usize,
    /// Recordings whose primary transfer failed.
    pub recordings_failed: usize,
    /// Best-effort thumbnail transfers that failed.
    pub thumbnails_failed: usize,
    /// Recordings downloaded but not retired remotely.
    pub retire_failed: usize,
    /// Bytes moved over the network.
    pub total_bytes: u64,
    /// Wall time spent downloading.
    pub elapsed: Duration,
    /// Peak per-file speed in bytes per second.
    pub peak_speed: u64,
}

impl SessionStats {
    /// Returns the average download speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }

    /// Adds the counters of a later pass.
    pub fn absorb(&mut self, other: &Self) {
        self.recordings_downloaded += other.recordings_downloaded;
        self.recordings_failed += other.recordings_failed;
        self.thumbnails_failed += other.thumbnails_failed;
        self.retire_failed += other.retire_failed;
        self.total_bytes += other.total_bytes;
        self.elapsed += other.elapsed;
        self.peak_speed = self.peak_speed.max(other.peak_speed);
    }
}

/// Tracks speed while a single file is being received.
pub struct DownloadStatsTracker {
    start_time: Instant,
    resumed_from: u64,
    received: AtomicU64,
    peak_speed: AtomicU64,
}

impl DownloadStatsTracker {
    /// Starts tracking a transfer that continues after `resumed_from` bytes.
    #[must_use]
    pub fn new(resumed_from: u64) -> Self {
        Self {
            start_time: Instant::now(),
            resumed_from,
            received: AtomicU64::new(0),
            peak_speed: AtomicU64::new(0),
        }
    }

    /// Records received bytes and returns the current average speed.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn record_bytes(&self, bytes: u64) -> u64 {
        let total = self.received.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let secs = self.start_time.elapsed().as_secs_f64();
        if secs > 0.0 {
            let speed = (total as f64 / secs) as u64;
            self.peak_speed.fetch_max(speed, Ordering::Relaxed);
            speed
        } else {
            0
        }
    }

    /// Bytes received so far in this attempt.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Returns the elapsed time since the transfer started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Converts this tracker into final file statistics.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn into_file_stats(self) -> FileStats {
        let elapsed = self.elapsed();
        let received = self.received();
        let secs = elapsed.as_secs_f64();
        let average_speed = if secs > 0.0 {
            (received as f64 / secs) as u64
        } else {
            0
        };
        FileStats {
            size: self.resumed_from + received,
            resumed_from: self.resumed_from,
            elapsed,
            average_speed,
            peak_speed: self.peak_speed.load(Ordering::Relaxed),
        }
    }
}

/// Accumulates [`SessionStats`] during a download pass.
pub struct SessionStatsBuilder {
    stats: SessionStats,
    start_time: Instant,
}

impl Default for SessionStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stats: SessionStats::default(),
            start_time: Instant::now(),
        }
    }

    /// Records a finished file transfer.
    pub fn add_file(&mut self, file_stats: &FileStats) {
        self.stats.total_bytes += file_stats.transferred();
        self.stats.peak_speed = self.stats.peak_speed.max(file_stats.peak_speed);
    }

    pub const fn add_recording(&mut self) {
        self.stats.recordings_downloaded += 1;
    }

    pub const fn add_failure(&mut self) {
        self.stats.recordings_failed += 1;
    }

    pub const fn add_thumbnail_failure(&mut self) {
        self.stats.thumbnails_failed += 1;
    }

    pub const fn add_retire_failure(&mut self) {
        self.stats.retire_failed += 1;
    }

    /// Builds the final session statistics.
    #[must_use]
    pub fn build(self) -> SessionStats {
        SessionStats {
            elapsed: self.start_time.elapsed(),
            ..self.stats
        }
    }
}

/// Formats a byte count as a human-readable string (B, KB, MB, GB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(&str, u64); 3] = [("GB", 1 << 30), ("MB", 1 << 20), ("KB", 1 << 10)];
    UNITS
        .iter()
        .find(|(_, size)| bytes >= *size)
        .map_or_else(
            || format!("{bytes} B"),
            |(unit, size)| format!("{:.2} {unit}", bytes as f64 / *size as f64),
        )
}

/// Formats a duration as `5.0s`, `1m 05s` or `1h 01m 05s`.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        3600.. => format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60),
        60.. => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{secs}.{}s", d.subsec_millis() / 100),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transferred_excludes_resumed_bytes() {
        let stats = FileStats {
            size: 1000,
            resumed_from: 400,
            ..FileStats::default()
        };
        assert_eq!(stats.transferred(), 600);
    }

    #[test]
    fn session_stats_average_speed() {
        let stats = SessionStats {
            total_bytes: 1000,
            elapsed: Duration::from_secs(2),
            ..SessionStats::default()
        };
        assert_eq!(stats.average_speed(), 500);
        assert_eq!(SessionStats::default().average_speed(), 0);
    }

    #[test]
    fn absorb_adds_counters() {
        let mut total = SessionStats {
            recordings_downloaded: 1,
            peak_speed: 900,
            ..SessionStats::default()
        };
        total.absorb(&SessionStats {
            recordings_downloaded: 2,
            recordings_failed: 1,
            total_bytes: 10,
            peak_speed: 300,
            ..SessionStats::default()
        });
        assert_eq!(total.recordings_downloaded, 3);
        assert_eq!(total.recordings_failed, 1);
        assert_eq!(total.total_bytes, 10);
        assert_eq!(total.peak_speed, 900);
    }

    #[test]
    fn tracker_reports_resumed_size() {
        let tracker = DownloadStatsTracker::new(50);
        tracker.record_bytes(20);
        tracker.record_bytes(30);
        let stats = tracker.into_file_stats();
        assert_eq!(stats.size, 100);
        assert_eq!(stats.resumed_from, 50);
        assert_eq!(stats.transferred(), 50);
    }

    #[test]
    fn session_stats_builder() {
        let mut builder = SessionStatsBuilder::new();
        builder.add_file(&FileStats {
            size: 500,
            resumed_from: 100,
            peak_speed: 600,
            ..FileStats::default()
        });
        builder.add_recording();
        builder.add_failure();
        builder.add_thumbnail_failure();

        let stats = builder.build();
        assert_eq!(stats.recordings_downloaded, 1);
        assert_eq!(stats.recordings_failed, 1);
        assert_eq!(stats.thumbnails_failed, 1);
        assert_eq!(stats.total_bytes, 400);
        assert_eq!(stats.peak_speed, 600);
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
        assert_eq!(format_bytes(3 * 1_073_741_824), "3.00 GB");
    }

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(Duration::from_millis(5300)), "5.3s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 01m 05s");
    }
}
