//! Download statistics types.

use std::time::{Duration, Instant};

/// Statistics for a single file download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    /// Bytes written.
    pub size: u64,
    /// Time taken to download the file.
    pub elapsed: Duration,
    /// Average download speed in bytes per second.
    pub average_speed: u64,
}

/// Outcome counts and totals for one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    /// Files downloaded or found present by the downloader.
    pub succeeded: usize,
    /// Files skipped because the local scan already had them.
    pub skipped: usize,
    /// Files that failed to download.
    pub failed: usize,
    /// Files the remote walk discovered.
    pub total: usize,
    /// Bytes actually transferred.
    pub bytes_downloaded: u64,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl Default for SyncStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStats {
    /// Creates empty stats.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            succeeded: 0,
            skipped: 0,
            failed: 0,
            total: 0,
            bytes_downloaded: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Average transfer rate over the whole run in bytes per second.
    #[must_use]
    pub fn average_speed(&self) -> u64 {
        bytes_per_second(self.bytes_downloaded, self.elapsed)
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn bytes_per_second(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Tracks bytes written while a single file streams in.
#[derive(Debug)]
pub struct DownloadStatsTracker {
    start_time: Instant,
    downloaded: u64,
}

impl Default for DownloadStatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadStatsTracker {
    /// Starts tracking now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            downloaded: 0,
        }
    }

    /// Records a written chunk and returns the running total.
    pub const fn record_bytes(&mut self, bytes: u64) -> u64 {
        self.downloaded = self.downloaded.saturating_add(bytes);
        self.downloaded
    }

    /// Returns the elapsed time since the download started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Converts this tracker into final file statistics.
    #[must_use]
    pub fn into_file_stats(self) -> FileStats {
        let elapsed = self.elapsed();
        FileStats {
            size: self.downloaded,
            elapsed,
            average_speed: bytes_per_second(self.downloaded, elapsed),
        }
    }
}

/// Builder for accumulating sync statistics file by file.
pub struct SyncStatsBuilder {
    stats: SyncStats,
    start_time: Instant,
}

impl Default for SyncStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatsBuilder {
    /// Creates a new builder; the run clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stats: SyncStats::new(),
            start_time: Instant::now(),
        }
    }

    /// Sets the number of files the walk discovered.
    pub const fn set_total(&mut self, total: usize) {
        self.stats.total = total;
    }

    /// Records a file skipped by the local scan.
    pub const fn add_skipped(&mut self) {
        self.stats.skipped += 1;
    }

    /// Records a file the downloader found already present.
    pub const fn add_present(&mut self) {
        self.stats.succeeded += 1;
    }

    /// Records a completed file download.
    pub const fn add_download(&mut self, file_stats: &FileStats) {
        self.stats.succeeded += 1;
        self.stats.bytes_downloaded += file_stats.size;
    }

    /// Records a failed file.
    pub const fn add_failure(&mut self) {
        self.stats.failed += 1;
    }

    /// Builds the final statistics.
    #[must_use]
    pub fn build(self) -> SyncStats {
        SyncStats {
            elapsed: self.start_time.elapsed(),
            ..self.stats
        }
    }
}
