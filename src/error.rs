use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

use crate::cache::FetchId;

/// Errors raised by the cache, the playback supervisor and the scheduler
///
/// Fetch errors (`Io`, `DownloadFailed`) only ever abort the single fetch
/// they belong to. `EngineDied` is terminal for the whole session.
#[derive(Error, Debug)]
pub enum Error {
    /// Local storage for a cache entry could not be created or written
    #[error("Failed to create cache entry {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source was unreachable or answered with a non-success status
    #[error("Failed to download from url {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// A remote-control call to the playback engine failed
    #[error("Player control error: {0}")]
    Control(String),

    /// The playback engine process exited
    #[error("Playback engine exited")]
    EngineDied,

    #[error("Unknown fetch id {0}")]
    UnknownFetch(FetchId),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn control(message: impl Display) -> Self {
        Error::Control(message.to_string())
    }

    pub fn download_failed(url: impl Into<String>, reason: impl Display) -> Self {
        Error::DownloadFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Only engine death ends the session; everything else is per-operation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::EngineDied)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
