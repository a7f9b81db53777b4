use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle for one embedded player. Never reused within a session, so events
/// from a destroyed player cannot reach its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// Player state as reported by the embedded player, with its numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum PlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl PlayerState {
    pub fn code(self) -> i32 {
        match self {
            PlayerState::Unstarted => -1,
            PlayerState::Ended => 0,
            PlayerState::Playing => 1,
            PlayerState::Paused => 2,
            PlayerState::Buffering => 3,
            PlayerState::Cued => 5,
        }
    }

    /// Buffering counts: the player is on its way to audible output.
    pub fn is_active(self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Buffering)
    }
}

impl TryFrom<i32> for PlayerState {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            -1 => PlayerState::Unstarted,
            0 => PlayerState::Ended,
            1 => PlayerState::Playing,
            2 => PlayerState::Paused,
            3 => PlayerState::Buffering,
            5 => PlayerState::Cued,
            other => return Err(format!("unknown player state code {other}")),
        })
    }
}

impl From<PlayerState> for i32 {
    fn from(state: PlayerState) -> Self {
        state.code()
    }
}

/// Something an embedded player reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    Ready { player: PlayerId, duration: f64 },
    StateChange { player: PlayerId, state: PlayerState },
    Progress { player: PlayerId, time: f64 },
    Error { player: PlayerId, code: i32 },
}

impl HostEvent {
    pub fn player(&self) -> PlayerId {
        match self {
            HostEvent::Ready { player, .. }
            | HostEvent::StateChange { player, .. }
            | HostEvent::Progress { player, .. }
            | HostEvent::Error { player, .. } => *player,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("player host is gone")]
    Disconnected,

    #[error("unknown {0}")]
    UnknownPlayer(PlayerId),
}

/// Whatever actually runs embedded video players: a webview, a test double.
///
/// Commands are fire-and-forget. State and time are whatever the host last
/// observed, so they may lag behind the commands issued.
pub trait PlayerHost {
    fn create(&mut self, player: PlayerId, video_id: &str) -> Result<(), HostError>;
    fn play(&mut self, player: PlayerId) -> Result<(), HostError>;
    fn pause(&mut self, player: PlayerId) -> Result<(), HostError>;
    fn stop(&mut self, player: PlayerId) -> Result<(), HostError>;
    fn seek(&mut self, player: PlayerId, seconds: f64) -> Result<(), HostError>;
    /// `volume` is on the player's own 0..=scale range.
    fn set_volume(&mut self, player: PlayerId, volume: u8) -> Result<(), HostError>;
    fn destroy(&mut self, player: PlayerId);

    fn state(&self, player: PlayerId) -> Option<PlayerState>;
    fn current_time(&self, player: PlayerId) -> Option<f64>;

    /// Next pending event, if any.
    fn poll_event(&mut self) -> Option<HostEvent>;
}
