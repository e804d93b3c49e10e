//! Playback scheduler: turns the queue into play, fetch and skip decisions
//!
//! The loop runs on a fixed tick. Each tick looks at the queue head and
//! either plays it (when its file is in the cache index) or fetches it and
//! parks until the fetch completes. While playing, the loop parks for the
//! length of the episode instead of polling the engine.

mod status;

pub use status::{PlayerStatus, ShutdownReason};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::FetchId;
use crate::error::{Error, Result};
use crate::player::{EngineState, PlaybackSupervisor};
use crate::queue::{ItemState, QueueItem};
use crate::session::Session;

/// How long a freshly loaded file may take to report its duration
const LOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// Slack added after the remaining play time
const END_SLACK: Duration = Duration::from_secs(1);

enum Flow {
    Continue,
    Exit(ShutdownReason),
}

enum Wake {
    Elapsed,
    Skipped,
    Exit(ShutdownReason),
}

pub struct Scheduler {
    session: Session,
    tick: Duration,
    status: Arc<watch::Sender<PlayerStatus>>,
    stop: CancellationToken,
    skip: watch::Receiver<u64>,
    died: Option<oneshot::Receiver<()>>,
}

impl Scheduler {
    /// Build a scheduler and the handle used to drive it from outside.
    ///
    /// Takes the supervisor's died notification; the scheduler is its only
    /// consumer.
    pub fn new(session: Session, tick: Duration) -> (Self, SchedulerHandle) {
        let (status, _) = watch::channel(PlayerStatus::default());
        let status = Arc::new(status);
        let stop = CancellationToken::new();
        let (skip, skip_rx) = watch::channel(0u64);
        let died = session.player.take_died();

        let handle = SchedulerHandle {
            session: session.clone(),
            status: status.clone(),
            stop: stop.clone(),
            skip: Arc::new(skip),
        };

        let scheduler = Self {
            session,
            tick,
            status,
            stop,
            skip: skip_rx,
            died,
        };
        (scheduler, handle)
    }

    /// Run until stopped or until the engine dies
    pub async fn run(mut self) -> ShutdownReason {
        info!("Scheduler running, tick {:?}", self.tick);
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break ShutdownReason::Stopped,
                _ = engine_died(&mut self.died, &self.session.player) => break ShutdownReason::EngineDied,
                _ = ticker.tick() => {}
            }

            match self.step().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(reason)) => break reason,
                Err(e) if e.is_fatal() || !self.session.player.is_alive() => {
                    break ShutdownReason::EngineDied;
                }
                Err(e) => warn!("Scheduler tick failed: {}", e),
            }
        };

        self.status.send_modify(|s| {
            s.playing = false;
            s.waiting = false;
            s.blocking_fetch = None;
        });
        info!("Scheduler stopped: {:?}", reason);
        reason
    }

    async fn step(&mut self) -> Result<Flow> {
        if !self.status.borrow().is_idle() || self.session.queue.is_empty() {
            return Ok(Flow::Continue);
        }

        let Some(item) = self.session.queue.pop_head() else {
            self.session.player.stop().await?;
            return Ok(Flow::Continue);
        };

        if !item.is_pending() && self.session.cache.is_cached(&item.path) {
            self.play(item).await
        } else {
            self.fetch(item).await
        }
    }

    async fn play(&mut self, item: QueueItem) -> Result<Flow> {
        let player = self.session.player.clone();
        // Skips requested before this episode do not apply to it
        self.skip.borrow_and_update();
        let started = match player.load(&item.path).await {
            Ok(()) => player.unpause().await,
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            // Still cached; retry it on a later tick
            self.session.queue.requeue(item);
            return Err(e);
        }

        let title = self
            .session
            .cache
            .query(&item.path)
            .map(|episode| episode.title)
            .unwrap_or_else(|| item.display_title());
        let source = url::Url::parse(&item.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));

        info!("▶ Playing {}", title);
        self.status.send_modify(|s| {
            s.playing = true;
            s.now_playing = Some(title);
            s.now_source = source;
        });

        let flow = self.wait_episode(&player).await;
        self.status.send_modify(|s| s.playing = false);
        flow
    }

    /// Park until the loaded episode should be over.
    ///
    /// Remaining time is re-read after every sleep, so pausing or seeking
    /// stretches or shortens the wait. A zero duration means the engine
    /// went idle.
    async fn wait_episode(&mut self, player: &PlaybackSupervisor) -> Result<Flow> {
        let loading = Instant::now();
        while player.duration().await? <= 0.0 {
            if loading.elapsed() >= LOAD_TIMEOUT {
                warn!("Engine never reported a duration, moving on");
                return Ok(Flow::Continue);
            }
            match self.sleep(self.tick).await {
                Wake::Elapsed => {}
                Wake::Skipped => return self.skipped(player).await,
                Wake::Exit(reason) => return Ok(Flow::Exit(reason)),
            }
        }

        loop {
            let duration = player.duration().await?;
            let position = player.position().await?;
            let remaining = duration - position;
            if duration <= 0.0 || remaining <= 0.0 {
                return Ok(Flow::Continue);
            }

            let wait = Duration::from_secs_f64(remaining) + END_SLACK;
            debug!("Episode at {:.1}/{:.1}s, sleeping {:?}", position, duration, wait);
            match self.sleep(wait).await {
                Wake::Elapsed => {}
                Wake::Skipped => return self.skipped(player).await,
                Wake::Exit(reason) => return Ok(Flow::Exit(reason)),
            }
        }
    }

    async fn skipped(&self, player: &PlaybackSupervisor) -> Result<Flow> {
        info!("Skipping current episode");
        player.stop().await?;
        Ok(Flow::Continue)
    }

    async fn fetch(&mut self, mut item: QueueItem) -> Result<Flow> {
        self.status.send_modify(|s| s.waiting = true);

        let cache = self.session.cache.clone();
        let id = match cache.find_ongoing(&item.path).await {
            Some(id) => {
                debug!("Joining fetch {} for {:?}", id, item.path);
                id
            }
            None => match cache.start_fetch(&item).await {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping {}: {}", item.display_title(), e);
                    self.status.send_modify(|s| s.waiting = false);
                    return Ok(Flow::Continue);
                }
            },
        };
        self.status.send_modify(|s| s.blocking_fetch = Some(id));

        let outcome = tokio::select! {
            biased;
            _ = self.stop.cancelled() => Err(ShutdownReason::Stopped),
            _ = engine_died(&mut self.died, &self.session.player) => Err(ShutdownReason::EngineDied),
            snapshot = cache.wait(id) => Ok(snapshot),
        };

        self.status.send_modify(|s| {
            s.waiting = false;
            s.blocking_fetch = None;
        });

        let snapshot = match outcome {
            Ok(snapshot) => snapshot?,
            Err(reason) => return Ok(Flow::Exit(reason)),
        };

        if snapshot.success {
            self.session.queue.mark_ready(&item.path);
            item.state = ItemState::Ready;
            self.session.queue.requeue(item);
        } else {
            warn!(
                "Fetch {} of {} failed, skipping: {}",
                id,
                item.display_title(),
                snapshot.status_text()
            );
        }
        Ok(Flow::Continue)
    }

    async fn sleep(&mut self, period: Duration) -> Wake {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Wake::Exit(ShutdownReason::Stopped),
            _ = engine_died(&mut self.died, &self.session.player) => Wake::Exit(ShutdownReason::EngineDied),
            Ok(()) = self.skip.changed() => Wake::Skipped,
            _ = tokio::time::sleep(period) => Wake::Elapsed,
        }
    }
}

/// Resolves once the engine is gone
async fn engine_died(died: &mut Option<oneshot::Receiver<()>>, player: &PlaybackSupervisor) {
    match died {
        Some(rx) => {
            let _ = rx.await;
        }
        None => {
            let mut state = player.subscribe_state();
            let _ = state.wait_for(|s| *s == EngineState::Dead).await;
        }
    }
}

/// Cloneable control surface for a running [`Scheduler`]
#[derive(Clone)]
pub struct SchedulerHandle {
    session: Session,
    status: Arc<watch::Sender<PlayerStatus>>,
    stop: CancellationToken,
    skip: Arc<watch::Sender<u64>>,
}

impl SchedulerHandle {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status.subscribe()
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Ask the loop to exit at its next suspension point
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    pub fn enqueue(&self, item: QueueItem) {
        self.session.queue.append(item);
    }

    /// Queue a fetch's item for playback; it plays once the fetch is done
    pub async fn enqueue_download(&self, id: FetchId) -> Result<QueueItem> {
        let snapshot = self
            .session
            .cache
            .get(id)
            .await
            .ok_or(Error::UnknownFetch(id))?;

        let mut item = self
            .session
            .queue
            .find_by_path(&snapshot.path)
            .unwrap_or(snapshot.item);
        if snapshot.completed && snapshot.success {
            item.state = ItemState::Ready;
        }

        self.session.queue.append(item.clone());
        info!("Enqueued: download {} will play once completed", id);
        Ok(item)
    }

    pub fn clear_queue(&self) {
        self.session.queue.clear();
    }

    /// End the current episode wait; the engine is halted and the next
    /// queued item is considered on the following tick
    pub fn skip(&self) {
        self.skip.send_modify(|requests| *requests += 1);
    }

    /// Pause and rewind the engine. The episode stays current and resumes
    /// with [`SchedulerHandle::unpause`].
    pub async fn stop_playback(&self) -> Result<()> {
        self.session.player.stop().await
    }

    pub async fn pause(&self) -> Result<()> {
        if !self.status().playing {
            return Ok(());
        }
        self.session.player.pause().await
    }

    pub async fn unpause(&self) -> Result<()> {
        if !self.status().playing {
            return Ok(());
        }
        self.session.player.unpause().await
    }

    pub async fn toggle_pause(&self) -> Result<()> {
        self.session.player.toggle_pause().await
    }

    pub async fn seek(&self, delta_secs: f64) -> Result<()> {
        self.session.player.seek(delta_secs).await
    }

    pub async fn is_paused(&self) -> Result<bool> {
        self.session.player.is_paused().await
    }

    /// (position, duration) in seconds, or zeros when nothing is playing
    pub async fn timings(&self) -> Result<(f64, f64)> {
        if !self.status().playing {
            return Ok((0.0, 0.0));
        }
        let position = self.session.player.position().await?;
        let duration = self.session.player.duration().await?;
        Ok((position, duration))
    }
}
