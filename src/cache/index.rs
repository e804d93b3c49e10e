use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::queue::QueueItem;

/// An episode whose file has been completely and successfully written
#[derive(Debug, Clone)]
pub struct CachedEpisode {
    pub title: String,
    pub item: QueueItem,
    pub size: u64,
    pub cached_at: DateTime<Utc>,
}

/// Local path -> cached episode.
///
/// Entries are only added by a fetch that finished successfully, so a hit
/// means the file is safe to hand to the playback engine.
#[derive(Debug, Default)]
pub struct CacheIndex {
    entries: RwLock<HashMap<PathBuf, CachedEpisode>>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, item: &QueueItem, size: u64) {
        let episode = CachedEpisode {
            title: item.display_title(),
            item: item.clone(),
            size,
            cached_at: Utc::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.path.clone(), episode);
    }

    pub fn query(&self, path: &Path) -> Option<CachedEpisode> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    pub fn remove(&self, path: &Path) -> Option<CachedEpisode> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_query() {
        let index = CacheIndex::new();
        let item = QueueItem::new("http://example.com/ep1.mp3", "/tmp/ep1.mp3").with_title("Ep 1");

        assert!(index.query(&item.path).is_none());
        index.insert(&item, 1234);

        let episode = index.query(Path::new("/tmp/ep1.mp3")).unwrap();
        assert_eq!(episode.title, "Ep 1");
        assert_eq!(episode.size, 1234);
        assert!(index.contains(&item.path));
        assert_eq!(index.len(), 1);

        index.remove(&item.path);
        assert!(index.is_empty());
    }
}
