//! Control of the external playback engine

#[cfg(unix)]
pub mod mpv_ipc;
pub mod remote;
pub mod supervisor;

#[cfg(unix)]
pub use mpv_ipc::{MpvConnector, MpvIpc};
pub use remote::{Connector, RemoteControl, SeekMode};
pub use supervisor::{EngineState, PlaybackSupervisor};
