use std::sync::Arc;

use crate::cache::DownloadCache;
use crate::player::PlaybackSupervisor;
use crate::queue::QueueStore;

/// The queue, cache and engine one scheduler runs against
#[derive(Clone)]
pub struct Session {
    pub queue: Arc<QueueStore>,
    pub cache: Arc<DownloadCache>,
    pub player: Arc<PlaybackSupervisor>,
}

impl Session {
    pub fn new(queue: QueueStore, cache: DownloadCache, player: PlaybackSupervisor) -> Self {
        Self {
            queue: Arc::new(queue),
            cache: Arc::new(cache),
            player: Arc::new(player),
        }
    }
}
