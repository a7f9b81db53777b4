//! Playback synchronization for the soundboard.
//!
//! The store holds what should be audible; this crate makes it so. Local
//! uploads play through an in-process mixer and remote videos through
//! embedded players, both behind [`PlaybackInstance`].

pub mod config;
pub mod instance;
pub mod library;
pub mod local;
pub mod poller;
pub mod reconcile;
pub mod remote;
pub mod seek;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, SessionConfig};
pub use instance::{Backend, BackendNotice, InstanceError, InstanceSettings, PlaybackInstance};
pub use library::{ImportError, add_remote, extract_video_id, import_file, import_local};
pub use local::{LocalBackend, LocalInstance};
pub use poller::PositionPoller;
pub use reconcile::{Engine, LiveEntry, LiveTable, ReconcileReport};
pub use remote::{
    BridgeEndpoint, BridgeHost, HostCommand, HostError, HostEvent, PlayerHost, PlayerId,
    PlayerState, RemoteBackend, RemoteInstance,
};
pub use session::{Session, SessionHandle, build_engine, open_store};
