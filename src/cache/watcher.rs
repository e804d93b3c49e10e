use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::record::{FetchId, FetchRecord};

/// Periodically re-stat a fetch's destination and publish its progress.
///
/// Exits on `stop` or as soon as the record is seen completed. The record
/// lock is held only for the stat and the arithmetic, never across the
/// sleep.
pub(crate) async fn watch_progress(
    records: Arc<RwLock<Vec<FetchRecord>>>,
    id: FetchId,
    path: PathBuf,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let mut guard = records.write().await;
        let Some(record) = guard.get_mut(id.index()) else {
            warn!("Progress watcher bound to unknown fetch {}", id);
            break;
        };
        if record.is_completed() {
            break;
        }

        match tokio::fs::metadata(&path).await {
            Ok(metadata) => {
                record.record_progress(metadata.len());
                let snapshot = record.snapshot();
                debug!(
                    "Fetch {}: {:.1}% ({}/{}) - elapsed: {}s",
                    id,
                    snapshot.percentage * 100.0,
                    snapshot.done,
                    snapshot.size,
                    snapshot.elapsed().num_seconds()
                );
            }
            Err(e) => {
                warn!("Progress watcher for fetch {} cannot stat {:?}: {}", id, path, e);
                break;
            }
        }
    }

    debug!("Progress watcher for fetch {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueItem;
    use tempfile::TempDir;

    fn records_for(path: &std::path::Path, size: u64) -> Arc<RwLock<Vec<FetchRecord>>> {
        let item = QueueItem::new("http://example.com/ep.mp3", path);
        Arc::new(RwLock::new(vec![FetchRecord::new(
            FetchId(0),
            item,
            size,
            CancellationToken::new(),
        )]))
    }

    #[tokio::test]
    async fn test_watcher_samples_file_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ep.mp3");
        std::fs::write(&path, [0u8; 25]).unwrap();

        let records = records_for(&path, 100);
        let stop = CancellationToken::new();
        let handle = tokio::spawn(watch_progress(
            records.clone(),
            FetchId(0),
            path.clone(),
            Duration::from_millis(10),
            stop.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let guard = records.read().await;
            let snapshot = guard[0].snapshot();
            assert_eq!(snapshot.done, 25);
            assert_eq!(snapshot.percentage, 0.25);
        }

        stop.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_watcher_exits_once_record_completes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ep.mp3");
        std::fs::write(&path, [0u8; 10]).unwrap();

        let records = records_for(&path, 10);
        {
            let mut guard = records.write().await;
            guard[0].finish(Ok(10));
        }

        let handle = tokio::spawn(watch_progress(
            records.clone(),
            FetchId(0),
            path,
            Duration::from_millis(10),
            CancellationToken::new(),
        ));

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher kept running after completion")
            .unwrap();
    }
}
