use async_trait::async_trait;
use podqueue::player::{Connector, RemoteControl, SeekMode};
use podqueue::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Stand-in for mpv: an episode "plays" for `episode_length` of wall time
/// after it is loaded, then the engine reports idle.
///
/// Behaves like the crate's `test_utils::mock_engine::FakeControl`, which
/// is `cfg(test)` and not visible from here. Keep the two in step.
pub struct FakeEngine {
    episode_length: Duration,
    loaded: Mutex<Vec<PathBuf>>,
    loaded_at: Mutex<Option<Instant>>,
    paused: AtomicBool,
    position: Mutex<f64>,
    should_fail: AtomicBool,
}

impl FakeEngine {
    pub fn new(episode_length: Duration) -> Arc<Self> {
        Arc::new(Self {
            episode_length,
            loaded: Mutex::new(Vec::new()),
            loaded_at: Mutex::new(None),
            paused: AtomicBool::new(false),
            position: Mutex::new(0.0),
            should_fail: AtomicBool::new(false),
        })
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    pub fn loaded(&self) -> Vec<PathBuf> {
        self.loaded.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::control("fake engine unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteControl for FakeEngine {
    async fn load(&self, path: &Path) -> Result<()> {
        self.check()?;
        self.loaded.lock().unwrap().push(path.to_path_buf());
        *self.loaded_at.lock().unwrap() = Some(Instant::now());
        *self.position.lock().unwrap() = 0.0;
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn set_pause(&self, paused: bool) -> Result<()> {
        self.check()?;
        self.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }

    async fn paused(&self) -> Result<bool> {
        self.check()?;
        Ok(self.paused.load(Ordering::SeqCst))
    }

    async fn seek(&self, offset_secs: f64, mode: SeekMode) -> Result<()> {
        self.check()?;
        let mut position = self.position.lock().unwrap();
        *position = match mode {
            SeekMode::Relative => (*position + offset_secs).max(0.0),
            SeekMode::Absolute => offset_secs,
        };
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        self.check()?;
        Ok(*self.position.lock().unwrap())
    }

    async fn duration(&self) -> Result<f64> {
        self.check()?;
        let loaded_at = *self.loaded_at.lock().unwrap();
        match loaded_at {
            Some(at) if at.elapsed() < self.episode_length => Ok(self.episode_length.as_secs_f64()),
            _ => Ok(0.0),
        }
    }
}

pub struct FakeConnector(pub Arc<FakeEngine>);

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn RemoteControl>> {
        Ok(self.0.clone())
    }
}
