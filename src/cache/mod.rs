//! Download cache: background fetches of queue items into local storage
//!
//! Every fetch gets a [`FetchRecord`] appended to a history guarded by one
//! reader/writer lock, a progress watcher task and a body-copy task. The
//! [`CacheIndex`] is filled only once a body copy has finished cleanly.

pub mod index;
pub mod record;
pub mod stats;
mod watcher;

pub use index::{CacheIndex, CachedEpisode};
pub use record::{FetchId, FetchRecord, FetchSnapshot, progress_fraction};
pub use stats::DownloaderStats;

use futures::StreamExt;
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::queue::QueueItem;

const CANCELLED: &str = "Cancelled";

pub struct DownloadCache {
    dir: PathBuf,
    http_client: Client,
    progress_interval: Duration,
    records: Arc<RwLock<Vec<FetchRecord>>>,
    index: Arc<CacheIndex>,
    stats: DownloaderStats,
}

impl DownloadCache {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let dir = config
            .download_dir()
            .map_err(|e| Error::Config(e.to_string()))?;

        let http_client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!("Download cache using {:?}", dir);
        Ok(Self {
            dir,
            http_client,
            progress_interval: config.progress_interval(),
            records: Arc::new(RwLock::new(Vec::new())),
            index: Arc::new(CacheIndex::new()),
            stats: DownloaderStats::new(),
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.dir
    }

    pub fn stats(&self) -> &DownloaderStats {
        &self.stats
    }

    /// Start fetching `item` into `item.path`.
    ///
    /// Returns once the response headers have arrived and the fetch is
    /// registered; the body is copied in the background. On failure no
    /// record is created and the destination file is removed.
    pub async fn start_fetch(&self, item: &QueueItem) -> Result<FetchId> {
        let url = url::Url::parse(&item.url)
            .map_err(|e| Error::download_failed(&item.url, format!("invalid url: {}", e)))?;

        if let Some(parent) = item.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| Error::Io {
                        path: item.path.clone(),
                        source,
                    })?;
            }
        }

        let file = File::create(&item.path).await.map_err(|source| Error::Io {
            path: item.path.clone(),
            source,
        })?;

        debug!("Sending HTTP request to: {}", url);
        let response = match self.http_client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                let reason = format!("HTTP {}", resp.status());
                return Err(self.abort_start(item, file, reason).await);
            }
            Err(e) => {
                return Err(self.abort_start(item, file, e).await);
            }
        };

        let size = response.content_length().unwrap_or(0);
        let cancel = CancellationToken::new();

        let id = {
            let mut records = self.records.write().await;
            let id = FetchId(records.len());
            records.push(FetchRecord::new(id, item.clone(), size, cancel.clone()));
            id
        };
        self.stats.increment_started();
        info!("Fetch {} started: {} -> {:?} ({} bytes)", id, item.url, item.path, size);

        let watcher_stop = cancel.child_token();
        let watcher = tokio::spawn(watcher::watch_progress(
            self.records.clone(),
            id,
            item.path.clone(),
            self.progress_interval,
            watcher_stop.clone(),
        ));

        let copy = BodyCopy {
            id,
            item: item.clone(),
            size,
            records: self.records.clone(),
            index: self.index.clone(),
            stats: self.stats.clone(),
            cancel,
            watcher_stop,
            watcher,
        };
        tokio::spawn(copy.run(response, file));

        Ok(id)
    }

    async fn abort_start(&self, item: &QueueItem, file: File, reason: impl std::fmt::Display) -> Error {
        drop(file);
        if let Err(e) = tokio::fs::remove_file(&item.path).await {
            warn!("Failed to remove {:?} after aborted fetch: {}", item.path, e);
        }
        let err = Error::download_failed(&item.url, reason);
        error!("❌ {}", err);
        err
    }

    /// Cancel a fetch. The partial file is left in place; cancelling a
    /// completed fetch does nothing.
    pub async fn cancel(&self, id: FetchId) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id.index())
            .ok_or(Error::UnknownFetch(id))?;

        if record.is_completed() {
            debug!("Fetch {} already completed, ignoring cancel", id);
            return Ok(());
        }

        record.cancel_token().cancel();
        record.finish(Err(CANCELLED.to_string()));
        self.stats.increment_cancelled();
        info!("Fetch {} cancelled", id);
        Ok(())
    }

    /// Remove the file left behind by a completed, unsuccessful fetch.
    /// Returns whether a file was removed.
    pub async fn discard(&self, id: FetchId) -> Result<bool> {
        let snapshot = self.get(id).await.ok_or(Error::UnknownFetch(id))?;
        if !snapshot.completed || snapshot.success {
            return Ok(false);
        }

        match tokio::fs::remove_file(&snapshot.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(Error::Io {
                path: snapshot.path,
                source,
            }),
        }
    }

    /// Wait without polling until the fetch completes
    pub async fn wait(&self, id: FetchId) -> Result<FetchSnapshot> {
        let mut completion = {
            let records = self.records.read().await;
            records
                .get(id.index())
                .ok_or(Error::UnknownFetch(id))?
                .subscribe()
        };

        // The sender lives in the record, which is never removed
        let _ = completion.wait_for(|completed| *completed).await;

        self.get(id).await.ok_or(Error::UnknownFetch(id))
    }

    pub fn query(&self, path: &Path) -> Option<CachedEpisode> {
        self.index.query(path)
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.index.contains(path)
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    pub async fn get(&self, id: FetchId) -> Option<FetchSnapshot> {
        let records = self.records.read().await;
        records.get(id.index()).map(FetchRecord::snapshot)
    }

    /// Consistent copy of the whole fetch history, oldest first
    pub async fn list(&self) -> Vec<FetchSnapshot> {
        let records = self.records.read().await;
        records.iter().map(FetchRecord::snapshot).collect()
    }

    /// Latest fetch still writing to `path`, if any
    pub async fn find_ongoing(&self, path: &Path) -> Option<FetchId> {
        let records = self.records.read().await;
        records
            .iter()
            .rev()
            .find(|r| !r.is_completed() && r.item().path == path)
            .map(FetchRecord::id)
    }

    pub async fn ongoing_count(&self) -> usize {
        let records = self.records.read().await;
        records.iter().filter(|r| !r.is_completed()).count()
    }

    /// Log a stats report every `period` until `shutdown` fires
    pub fn spawn_stats_reporter(
        &self,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let stats = self.stats.clone();
        let records = self.records.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let active_details: Vec<(String, f64)> = {
                    let records = records.read().await;
                    records
                        .iter()
                        .filter(|r| !r.is_completed())
                        .map(|r| {
                            let snapshot = r.snapshot();
                            (snapshot.item.display_title(), snapshot.percentage)
                        })
                        .collect()
                };

                info!("{}", stats.format_report(active_details));
            }
        })
    }
}

enum CopyOutcome {
    Copied(u64),
    Failed(String),
    /// The fetch's token fired without going through `DownloadCache::cancel`
    Cancelled,
}

/// Background half of a fetch: owns the destination file until it closes
struct BodyCopy {
    id: FetchId,
    item: QueueItem,
    size: u64,
    records: Arc<RwLock<Vec<FetchRecord>>>,
    index: Arc<CacheIndex>,
    stats: DownloaderStats,
    cancel: CancellationToken,
    watcher_stop: CancellationToken,
    watcher: JoinHandle<()>,
}

impl BodyCopy {
    async fn run(self, response: Response, mut file: File) {
        let outcome = tokio::select! {
            result = stream_to_file(response, &mut file, self.size) => match result {
                Ok(bytes) => CopyOutcome::Copied(bytes),
                Err(message) => CopyOutcome::Failed(message),
            },
            _ = self.cancel.cancelled() => CopyOutcome::Cancelled,
        };
        drop(file);

        self.watcher_stop.cancel();
        if let Err(e) = self.watcher.await {
            warn!("Progress watcher for fetch {} panicked: {}", self.id, e);
        }

        let failed = {
            let mut records = self.records.write().await;
            let Some(record) = records.get_mut(self.id.index()) else {
                error!("Fetch {} vanished from the history", self.id);
                return;
            };

            if record.is_completed() {
                debug!("Fetch {} was finalised before its copy ended", self.id);
                return;
            }

            match outcome {
                CopyOutcome::Copied(bytes) => {
                    // Index first so anyone seeing success also sees the entry
                    self.index.insert(&self.item, bytes);
                    record.finish(Ok(bytes));
                    self.stats.increment_completed();
                    self.stats.add_bytes_downloaded(bytes);
                    info!("✅ Fetch {} completed: {:?} ({} bytes)", self.id, self.item.path, bytes);
                    false
                }
                CopyOutcome::Cancelled => {
                    record.finish(Err(CANCELLED.to_string()));
                    self.stats.increment_cancelled();
                    info!("Fetch {} cancelled", self.id);
                    false
                }
                CopyOutcome::Failed(message) => {
                    error!("❌ Fetch {} failed for {}: {}", self.id, self.item.url, message);
                    record.finish(Err(message));
                    self.stats.increment_failed();
                    true
                }
            }
        };

        if failed {
            if let Err(e) = tokio::fs::remove_file(&self.item.path).await {
                warn!("Failed to remove partial file {:?}: {}", self.item.path, e);
            }
        }
    }
}

async fn stream_to_file(
    response: Response,
    file: &mut File,
    expected: u64,
) -> std::result::Result<u64, String> {
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("Stream error: {}", e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("Write error: {}", e))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| format!("Write error: {}", e))?;
    file.sync_all().await.map_err(|e| format!("Write error: {}", e))?;

    if expected > 0 && written != expected {
        return Err(format!(
            "Incomplete download: expected {} bytes, received {}",
            expected, written
        ));
    }

    Ok(written)
}
