use soundboard_store::{SceneTrackId, StoreError, Track, TrackKind};

use crate::remote::HostError;

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("backend cannot play {0:?} tracks")]
    WrongSource(TrackKind),

    #[error("failed to load audio: {0}")]
    Load(#[from] StoreError),

    #[error("failed to decode audio: {0}")]
    Decode(anyhow::Error),

    #[error("mixer rejected voice: {0}")]
    Mixer(anyhow::Error),

    #[error("player host error: {0}")]
    Host(#[from] HostError),
}

/// Initial playback settings handed to a backend when an instance is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceSettings {
    pub volume: f32,
    pub looping: bool,
}

/// Uniform control surface over one live playback of one scene track.
///
/// After `destroy` every operation is a no-op and `destroy` itself may be
/// called again safely.
pub trait PlaybackInstance {
    fn play(&mut self) -> Result<(), InstanceError>;
    fn pause(&mut self) -> Result<(), InstanceError>;
    /// Pause and rewind to the start.
    fn stop(&mut self) -> Result<(), InstanceError>;
    fn seek(&mut self, seconds: f64) -> Result<(), InstanceError>;
    /// `volume` is within [0, 1].
    fn set_volume(&mut self, volume: f32) -> Result<(), InstanceError>;
    fn set_loop(&mut self, looping: bool) -> Result<(), InstanceError>;

    /// Seconds from the start of the track.
    fn position(&self) -> f64;
    fn is_playing(&self) -> bool;
    fn volume(&self) -> f32;
    fn looping(&self) -> bool;

    /// Whether the instance can accept seeks. Instances that load
    /// asynchronously return false until they are ready.
    fn is_ready(&self) -> bool {
        true
    }

    /// Whether the backend gave up on this instance.
    fn is_failed(&self) -> bool {
        false
    }

    fn destroy(&mut self);
}

/// Something a backend observed outside of any call made on an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendNotice {
    Ready { id: SceneTrackId, duration: f64 },
    Failed { id: SceneTrackId, reason: String },
}

/// Factory for playback instances of one source kind.
pub trait Backend {
    fn create(
        &mut self,
        id: SceneTrackId,
        track: &Track,
        settings: InstanceSettings,
    ) -> Result<Box<dyn PlaybackInstance>, InstanceError>;

    /// Drain notices gathered since the last call.
    fn poll_notices(&mut self) -> Vec<BackendNotice> {
        Vec::new()
    }

    /// Periodic housekeeping on the control thread.
    fn maintain(&mut self) {}
}
