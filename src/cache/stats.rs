use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Statistics for the download cache
#[derive(Debug, Clone)]
pub struct DownloaderStats {
    /// Total number of fetches started
    pub downloads_started: Arc<AtomicU64>,
    /// Total number of fetches completed successfully
    pub downloads_completed: Arc<AtomicU64>,
    /// Total number of fetches that failed mid-stream
    pub downloads_failed: Arc<AtomicU64>,
    /// Total number of fetches cancelled by the user
    pub downloads_cancelled: Arc<AtomicU64>,
    /// Total bytes written by successful fetches
    pub total_bytes_downloaded: Arc<AtomicU64>,
    /// Start time for calculating uptime
    pub start_time: Instant,
}

impl DownloaderStats {
    pub fn new() -> Self {
        Self {
            downloads_started: Arc::new(AtomicU64::new(0)),
            downloads_completed: Arc::new(AtomicU64::new(0)),
            downloads_failed: Arc::new(AtomicU64::new(0)),
            downloads_cancelled: Arc::new(AtomicU64::new(0)),
            total_bytes_downloaded: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn increment_started(&self) {
        self.downloads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_completed(&self) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cancelled(&self) {
        self.downloads_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_downloaded(&self, bytes: u64) {
        self.total_bytes_downloaded
            .fetch_add(bytes, Ordering::Relaxed);
    }

    /// One-line summary plus up to three active fetches as (name, fraction)
    pub fn format_report(&self, active_download_details: Vec<(String, f64)>) -> String {
        let uptime_secs = self.start_time.elapsed().as_secs();
        let hours = uptime_secs / 3600;
        let minutes = (uptime_secs % 3600) / 60;
        let seconds = uptime_secs % 60;

        let total_mb =
            self.total_bytes_downloaded.load(Ordering::Relaxed) as f64 / (1024.0 * 1024.0);

        let mut report = format!(
            "📊 Downloader Stats [{}h {}m {}s] | Started: {} | Completed: {} | Failed: {} | Cancelled: {} | Total: {:.1} MB",
            hours,
            minutes,
            seconds,
            self.downloads_started.load(Ordering::Relaxed),
            self.downloads_completed.load(Ordering::Relaxed),
            self.downloads_failed.load(Ordering::Relaxed),
            self.downloads_cancelled.load(Ordering::Relaxed),
            total_mb,
        );

        if !active_download_details.is_empty() {
            report.push_str(&format!("\n   Active: {}", active_download_details.len()));
            for (name, progress) in active_download_details.iter().take(3) {
                report.push_str(&format!("\n     • {} [{:.0}%]", name, progress * 100.0));
            }
        }

        report
    }
}

impl Default for DownloaderStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let stats = DownloaderStats::new();
        stats.increment_started();
        stats.increment_started();
        stats.increment_completed();
        stats.increment_cancelled();
        stats.add_bytes_downloaded(2 * 1024 * 1024);

        let report = stats.format_report(vec![("episode-42".to_string(), 0.5)]);
        assert!(report.contains("Started: 2"));
        assert!(report.contains("Completed: 1"));
        assert!(report.contains("Cancelled: 1"));
        assert!(report.contains("Total: 2.0 MB"));
        assert!(report.contains("episode-42 [50%]"));
    }

    #[test]
    fn test_report_without_active_downloads() {
        let report = DownloaderStats::new().format_report(Vec::new());
        assert!(!report.contains("Active"));
    }
}
