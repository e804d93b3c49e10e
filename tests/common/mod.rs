#![allow(dead_code)]

pub mod engine;

use podqueue::cache::DownloadCache;
use podqueue::config::{CacheConfig, PlayerConfig};
use podqueue::player::PlaybackSupervisor;
use podqueue::queue::QueueStore;
use podqueue::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use engine::{FakeConnector, FakeEngine};

pub const TICK: Duration = Duration::from_millis(20);

pub fn cache_config(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        download_dir: Some(dir.path().to_path_buf()),
        progress_interval_ms: 20,
        ..CacheConfig::default()
    }
}

/// Engine config running `program args..` in place of mpv
pub fn engine_config(command: &[&str]) -> PlayerConfig {
    PlayerConfig {
        program: command[0].to_string(),
        args: command[1..].iter().map(|a| a.to_string()).collect(),
        connect_attempts: 10,
        connect_backoff_ms: 5,
        connect_backoff_max_ms: 50,
        tick_ms: TICK.as_millis() as u64,
        ..PlayerConfig::default()
    }
}

/// Session over a fresh cache in `dir`, an empty queue and a fake engine
pub async fn test_session(dir: &TempDir, engine: Arc<FakeEngine>, command: &[&str]) -> Session {
    let cache = DownloadCache::new(&cache_config(dir)).unwrap();
    let player = PlaybackSupervisor::launch(&engine_config(command), &FakeConnector(engine))
        .await
        .unwrap();
    Session::new(QueueStore::new(), cache, player)
}

/// Poll `condition` every 10ms until it holds or `max_wait` passes
pub async fn wait_until<F>(mut condition: F, max_wait: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < max_wait {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
