use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::queue::QueueItem;

/// Stable identifier of a fetch: its index in the append-only history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchId(pub(crate) usize);

impl FetchId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for FetchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fraction of `done` over `size`, clamped to [0, 1]; zero when size is unknown
pub fn progress_fraction(done: u64, size: u64) -> f64 {
    if size == 0 {
        return 0.0;
    }
    (done as f64 / size as f64).clamp(0.0, 1.0)
}

/// Mutable progress and outcome of one fetch.
///
/// Only ever touched while holding the cache's record lock.
#[derive(Debug)]
pub struct FetchRecord {
    id: FetchId,
    item: QueueItem,
    /// Declared content length, 0 when the source did not say
    size: u64,
    done: u64,
    percentage: f64,
    started: DateTime<Utc>,
    completed: bool,
    success: bool,
    error: Option<String>,
    cancel: CancellationToken,
    completion: watch::Sender<bool>,
}

impl FetchRecord {
    pub(crate) fn new(id: FetchId, item: QueueItem, size: u64, cancel: CancellationToken) -> Self {
        let (completion, _) = watch::channel(false);
        Self {
            id,
            item,
            size,
            done: 0,
            percentage: 0.0,
            started: Utc::now(),
            completed: false,
            success: false,
            error: None,
            cancel,
            completion,
        }
    }

    pub fn id(&self) -> FetchId {
        self.id
    }

    pub fn item(&self) -> &QueueItem {
        &self.item
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record a new on-disk size; progress never moves backwards
    pub(crate) fn record_progress(&mut self, done: u64) {
        self.done = self.done.max(done);
        self.percentage = progress_fraction(self.done, self.size);
    }

    /// Mark the fetch completed. Returns false when it already was, in
    /// which case nothing changes.
    pub(crate) fn finish(&mut self, outcome: Result<u64, String>) -> bool {
        if self.completed {
            return false;
        }

        match outcome {
            Ok(bytes) => {
                self.record_progress(bytes);
                self.success = true;
            }
            Err(message) => {
                self.success = false;
                self.error = Some(message);
            }
        }
        self.completed = true;
        self.completion.send_replace(true);
        true
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.completion.subscribe()
    }

    pub fn snapshot(&self) -> FetchSnapshot {
        FetchSnapshot {
            id: self.id,
            item: self.item.clone(),
            path: self.item.path.clone(),
            size: self.size,
            done: self.done,
            percentage: self.percentage,
            started: self.started,
            completed: self.completed,
            success: self.success,
            error: self.error.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Point-in-time copy of a [`FetchRecord`] for observers
#[derive(Debug, Clone)]
pub struct FetchSnapshot {
    pub id: FetchId,
    pub item: QueueItem,
    pub path: PathBuf,
    pub size: u64,
    pub done: u64,
    pub percentage: f64,
    pub started: DateTime<Utc>,
    pub completed: bool,
    /// Meaningful only once `completed` is set
    pub success: bool,
    pub error: Option<String>,
    pub cancel: CancellationToken,
}

impl FetchSnapshot {
    pub fn status_text(&self) -> String {
        if !self.completed {
            return "In progress".to_string();
        }
        if self.success {
            "Finished".to_string()
        } else {
            format!("Failed ({})", self.error.as_deref().unwrap_or("unknown error"))
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started
    }
}
