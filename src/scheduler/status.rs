use crate::cache::FetchId;

/// What the scheduler is doing, published for observers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStatus {
    /// An episode is loaded and its wait has not ended
    pub playing: bool,
    /// The scheduler is parked on a fetch
    pub waiting: bool,
    pub now_playing: Option<String>,
    /// Host of the episode's source url
    pub now_source: Option<String>,
    /// Fetch the scheduler is currently parked on
    pub blocking_fetch: Option<FetchId>,
}

impl PlayerStatus {
    pub fn is_idle(&self) -> bool {
        !self.playing && !self.waiting
    }
}

/// Why the scheduler loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Stopped,
    EngineDied,
}
