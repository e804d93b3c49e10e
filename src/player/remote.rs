use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// How a seek offset is interpreted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Relative,
    Absolute,
}

impl SeekMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeekMode::Relative => "relative",
            SeekMode::Absolute => "absolute",
        }
    }
}

/// Remote-control surface of a running playback engine.
///
/// Any error means the control channel is unusable; the caller decides
/// whether the engine is gone by asking the supervisor.
#[async_trait]
pub trait RemoteControl: Send + Sync {
    async fn load(&self, path: &Path) -> Result<()>;
    async fn set_pause(&self, paused: bool) -> Result<()>;
    async fn paused(&self) -> Result<bool>;
    async fn seek(&self, offset_secs: f64, mode: SeekMode) -> Result<()>;
    /// Seconds into the current file, 0 when nothing is loaded
    async fn position(&self) -> Result<f64>;
    /// Length of the current file in seconds, 0 while still unknown
    async fn duration(&self) -> Result<f64>;
}

/// Opens a control channel to an engine that may still be starting up
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn RemoteControl>>;
}
