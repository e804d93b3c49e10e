use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::remote::{Connector, RemoteControl, SeekMode};
use crate::config::PlayerConfig;
use crate::error::{Error, Result};

/// Lifecycle of the external engine; `Dead` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Launching,
    Connecting,
    Ready,
    Dead,
}

/// Owns the playback engine process and its control channel.
///
/// A liveness task owns the child process; when the process exits the
/// state becomes [`EngineState::Dead`] and the one-shot died signal fires.
/// The engine is never respawned.
pub struct PlaybackSupervisor {
    state: Arc<watch::Sender<EngineState>>,
    control: Arc<dyn RemoteControl>,
    died: Mutex<Option<oneshot::Receiver<()>>>,
    shutdown: CancellationToken,
    liveness: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackSupervisor {
    /// Start the engine and connect to its control endpoint.
    ///
    /// Connect attempts are bounded by `connect_attempts` with capped
    /// exponential backoff. The engine exiting first yields
    /// [`Error::EngineDied`].
    pub async fn launch(config: &PlayerConfig, connector: &dyn Connector) -> Result<Self> {
        let (state, _) = watch::channel(EngineState::Launching);
        let state = Arc::new(state);

        let child = Command::new(&config.program)
            .args(config.command_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::control(format!("failed to start {}: {}", config.program, e)))?;
        info!(
            "Launched playback engine {} (pid {:?})",
            config.program,
            child.id()
        );

        let shutdown = CancellationToken::new();
        let (died_tx, died_rx) = oneshot::channel();
        let liveness = tokio::spawn(monitor_engine(
            child,
            state.clone(),
            shutdown.clone(),
            died_tx,
        ));

        let control = match connect(config, connector, &state).await {
            Ok(control) => control,
            Err(e) => {
                shutdown.cancel();
                return Err(e);
            }
        };

        let ready = state.send_if_modified(|current| {
            if *current == EngineState::Dead {
                return false;
            }
            *current = EngineState::Ready;
            true
        });
        if !ready {
            return Err(Error::EngineDied);
        }
        info!("Connected to playback engine at {:?}", config.ipc_path);

        Ok(Self {
            state,
            control,
            died: Mutex::new(Some(died_rx)),
            shutdown,
            liveness: Mutex::new(Some(liveness)),
        })
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn is_alive(&self) -> bool {
        self.state() != EngineState::Dead
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// The terminal died notification. Handed out once; later calls get `None`.
    pub fn take_died(&self) -> Option<oneshot::Receiver<()>> {
        self.died
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn remote(&self) -> Result<&dyn RemoteControl> {
        if self.state() == EngineState::Dead {
            return Err(Error::control("playback engine is not running"));
        }
        Ok(self.control.as_ref())
    }

    pub async fn load(&self, path: &Path) -> Result<()> {
        info!("Loading {:?}", path);
        self.remote()?.load(path).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.remote()?.set_pause(true).await
    }

    pub async fn unpause(&self) -> Result<()> {
        self.remote()?.set_pause(false).await
    }

    pub async fn toggle_pause(&self) -> Result<()> {
        let remote = self.remote()?;
        let paused = remote.paused().await?;
        remote.set_pause(!paused).await
    }

    /// Pause and rewind to the start
    pub async fn stop(&self) -> Result<()> {
        let remote = self.remote()?;
        remote.set_pause(true).await?;
        remote.seek(0.0, SeekMode::Absolute).await
    }

    pub async fn seek(&self, delta_secs: f64) -> Result<()> {
        self.remote()?.seek(delta_secs, SeekMode::Relative).await
    }

    pub async fn position(&self) -> Result<f64> {
        self.remote()?.position().await
    }

    pub async fn duration(&self) -> Result<f64> {
        self.remote()?.duration().await
    }

    pub async fn is_paused(&self) -> Result<bool> {
        self.remote()?.paused().await
    }

    /// Kill the engine and wait for the liveness task to observe it
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let liveness = self
            .liveness
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = liveness {
            if let Err(e) = handle.await {
                warn!("Engine liveness task failed: {}", e);
            }
        }
    }
}

impl Drop for PlaybackSupervisor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn connect(
    config: &PlayerConfig,
    connector: &dyn Connector,
    state: &watch::Sender<EngineState>,
) -> Result<Arc<dyn RemoteControl>> {
    state.send_if_modified(|current| {
        if *current == EngineState::Dead {
            return false;
        }
        *current = EngineState::Connecting;
        true
    });
    let mut state_rx = state.subscribe();

    let mut attempt = 0;
    loop {
        if *state_rx.borrow_and_update() == EngineState::Dead {
            return Err(Error::EngineDied);
        }

        let err = match connector.connect().await {
            Ok(control) => return Ok(control),
            Err(e) => e,
        };

        attempt += 1;
        if attempt >= config.connect_attempts {
            error!("Giving up on playback engine after {} attempts", attempt);
            return Err(Error::control(format!(
                "could not connect after {} attempts: {}",
                attempt, err
            )));
        }

        let backoff = config.connect_backoff(attempt - 1);
        debug!("Engine not reachable yet ({}), retrying in {:?}", err, backoff);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = state_rx.wait_for(|s| *s == EngineState::Dead) => {}
        }
    }
}

async fn monitor_engine(
    mut child: Child,
    state: Arc<watch::Sender<EngineState>>,
    shutdown: CancellationToken,
    died: oneshot::Sender<()>,
) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => error!("Playback engine exited: {}", status),
            Err(e) => error!("Lost track of playback engine: {}", e),
        },
        _ = shutdown.cancelled() => {
            debug!("Stopping playback engine");
            if let Err(e) = child.kill().await {
                warn!("Failed to kill playback engine: {}", e);
            }
        }
    }

    state.send_replace(EngineState::Dead);
    let _ = died.send(());
}
