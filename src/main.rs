use anyhow::{Context, Result, anyhow};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use podqueue::cache::DownloadCache;
use podqueue::config::Config;
use podqueue::player::{MpvConnector, PlaybackSupervisor};
use podqueue::queue::QueueStore;
use podqueue::scheduler::{Scheduler, ShutdownReason};
use podqueue::session::Session;

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("podqueue=info")),
        )
        .init();

    info!("Starting podqueue {}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(run())
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    let cache = DownloadCache::new(&config.cache)?;

    let queue = match config.queue.queue_file() {
        Some(path) if path.exists() => QueueStore::load_newsboat(&path, cache.download_dir())?,
        Some(path) => {
            info!("No queue file at {:?}, starting with an empty queue", path);
            QueueStore::new()
        }
        None => QueueStore::new(),
    };

    let connector = MpvConnector::new(&config.player.ipc_path);
    let player = PlaybackSupervisor::launch(&config.player, &connector)
        .await
        .context("Failed to start playback engine")?;

    let session = Session::new(queue, cache, player);
    let background = CancellationToken::new();
    let stats_reporter = match config.cache.stats_interval_secs {
        0 => None,
        secs => Some(
            session
                .cache
                .spawn_stats_reporter(Duration::from_secs(secs), background.clone()),
        ),
    };

    let (scheduler, handle) = Scheduler::new(session.clone(), config.player.tick());
    let stop = handle.stop_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                stop.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    let reason = scheduler.run().await;

    background.cancel();
    if let Some(reporter) = stats_reporter {
        let _ = reporter.await;
    }

    let ongoing = session.cache.ongoing_count().await;
    if ongoing > 0 {
        warn!("Abandoning {} unfinished downloads", ongoing);
    }
    session.player.shutdown().await;

    match reason {
        ShutdownReason::Stopped => {
            info!("Goodbye");
            Ok(())
        }
        ShutdownReason::EngineDied => {
            error!("Playback engine exited, terminating");
            Err(anyhow!("playback engine exited unexpectedly"))
        }
    }
}
