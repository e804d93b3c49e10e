#![cfg(test)]

/// Common test utilities
pub mod common {
    use std::future::Future;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Wait for an async condition to become true
    pub async fn wait_for_async<F, Fut>(mut condition: F, max_wait: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < max_wait {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        false
    }
}

/// In-memory stand-in for the playback engine's control channel
pub mod mock_engine {
    use crate::error::{Error, Result};
    use crate::player::{Connector, RemoteControl, SeekMode};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    /// Reports `duration_after_load` once something is loaded and goes
    /// idle (duration 0) when that much wall time has passed. Position only
    /// moves through seeks. `tests/common/engine.rs` mirrors this for the
    /// integration tests.
    pub struct FakeControl {
        should_fail: AtomicBool,
        pub loaded: Mutex<Vec<PathBuf>>,
        paused: AtomicBool,
        position: Mutex<f64>,
        loaded_at: Mutex<Option<Instant>>,
        duration_after_load: f64,
    }

    impl FakeControl {
        pub fn new(duration_after_load: f64) -> Self {
            Self {
                should_fail: AtomicBool::new(false),
                loaded: Mutex::new(Vec::new()),
                paused: AtomicBool::new(false),
                position: Mutex::new(0.0),
                loaded_at: Mutex::new(None),
                duration_after_load,
            }
        }

        pub fn set_should_fail(&self, should_fail: bool) {
            self.should_fail.store(should_fail, Ordering::SeqCst);
        }

        pub fn loaded(&self) -> Vec<PathBuf> {
            self.loaded.lock().unwrap().clone()
        }

        fn check(&self) -> Result<()> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(Error::control("mock control channel closed"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteControl for FakeControl {
        async fn load(&self, path: &Path) -> Result<()> {
            self.check()?;
            self.loaded.lock().unwrap().push(path.to_path_buf());
            *self.position.lock().unwrap() = 0.0;
            *self.loaded_at.lock().unwrap() = Some(Instant::now());
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
                Some(at) if at.elapsed().as_secs_f64() < self.duration_after_load => {
                    Ok(self.duration_after_load)
                }
                _ => Ok(0.0),
            }
        }
    }

    /// Hands out the shared [`FakeControl`], optionally refusing the first
    /// few attempts like an engine whose socket is not up yet
    pub struct FakeConnector {
        control: Arc<FakeControl>,
        refuse: usize,
        attempts: AtomicUsize,
    }

    impl FakeConnector {
        pub fn new(control: Arc<FakeControl>) -> Self {
            Self {
                control,
                refuse: 0,
                attempts: AtomicUsize::new(0),
            }
        }

        pub fn failing_first(mut self, attempts: usize) -> Self {
            self.refuse = attempts;
            self
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self) -> Result<Arc<dyn RemoteControl>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.refuse {
                return Err(Error::control("connection refused"));
            }
            Ok(self.control.clone())
        }
    }
}
