//! FIFO play queue shared between the UI and the scheduler
//!
//! All operations take a short std mutex and never await, so the store can
//! be used from synchronous UI callbacks as well as from async tasks.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Whether an item's media is available locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    /// Not yet locally available
    Pending,
    /// Fetched into the cache
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub url: String,
    pub path: PathBuf,
    pub title: Option<String>,
    pub state: ItemState,
}

impl QueueItem {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            title: None,
            state: ItemState::Pending,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title for display, falling back to the file name
    pub fn display_title(&self) -> String {
        if let Some(ref title) = self.title {
            return title.clone();
        }
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.url.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.state == ItemState::Pending
    }
}

#[derive(Debug, Default)]
pub struct QueueStore {
    items: Mutex<VecDeque<QueueItem>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = QueueItem>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().collect()),
        }
    }

    /// Load newsboat's queue file: one `<url> "<path>"` entry per line.
    ///
    /// Relative paths resolve under `download_dir`. Malformed lines are
    /// skipped rather than failing the whole load.
    pub fn load_newsboat(path: &Path, download_dir: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut items = VecDeque::new();
        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_queue_line(line) {
                Some((url, file)) => {
                    let file = PathBuf::from(file);
                    let file = if file.is_relative() {
                        download_dir.join(file)
                    } else {
                        file
                    };
                    items.push_back(QueueItem::new(url, file));
                }
                None => warn!("Skipping malformed queue line {}: {:?}", number + 1, line),
            }
        }

        info!("Loaded {} queue items from {:?}", items.len(), path);
        Ok(Self {
            items: Mutex::new(items),
        })
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<QueueItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, item: QueueItem) {
        debug!("Enqueued {}", item.url);
        self.items().push_back(item);
    }

    /// Put an item back at the head so it is the next one considered
    pub fn requeue(&self, item: QueueItem) {
        self.items().push_front(item);
    }

    /// Remove and return the head; `None` signals an empty queue
    pub fn pop_head(&self) -> Option<QueueItem> {
        self.items().pop_front()
    }

    pub fn remove(&self, index: usize) -> Option<QueueItem> {
        self.items().remove(index)
    }

    pub fn clear(&self) {
        let mut items = self.items();
        info!("Clearing {} queued items", items.len());
        items.clear();
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Visit items in order until the visitor returns false
    pub fn iterate<F>(&self, mut visitor: F)
    where
        F: FnMut(usize, &QueueItem) -> bool,
    {
        let items = self.items();
        for (index, item) in items.iter().enumerate() {
            if !visitor(index, item) {
                break;
            }
        }
    }

    pub fn find_by_path(&self, path: &Path) -> Option<QueueItem> {
        self.items().iter().find(|item| item.path == path).cloned()
    }

    /// Flip every queued entry for `path` to ready; returns how many changed
    pub fn mark_ready(&self, path: &Path) -> usize {
        let mut changed = 0;
        for item in self.items().iter_mut().filter(|item| item.path == path) {
            if item.state != ItemState::Ready {
                item.state = ItemState::Ready;
                changed += 1;
            }
        }
        changed
    }

    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.items().iter().cloned().collect()
    }
}

fn parse_queue_line(line: &str) -> Option<(String, String)> {
    let (url, rest) = line.split_once(char::is_whitespace)?;
    let path = rest.trim().trim_matches('"');
    if url.is_empty() || path.is_empty() {
        return None;
    }
    Some((url.to_string(), path.to_string()))
}
