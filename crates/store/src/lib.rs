mod blob;
mod model;
mod persist;
mod store;

use std::path::PathBuf;

pub use blob::{BlobError, BlobStore, DirBlobStore, MemoryBlobStore};
pub use model::{
    Scene, SceneId, SceneTrack, SceneTrackId, SceneTrackPatch, StoreState, Track, TrackId,
    TrackKind, TrackPatch, TrackSource, clamp_volume,
};
pub use persist::{load_state, save_state};
pub use store::Store;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown track {0}")]
    UnknownTrack(TrackId),

    #[error("unknown scene {0}")]
    UnknownScene(SceneId),

    #[error("unknown scene track {0}")]
    UnknownSceneTrack(SceneTrackId),

    #[error("track {0} already exists")]
    DuplicateTrack(TrackId),

    #[error("local track {0} was added without audio data")]
    MissingPayload(TrackId),

    #[error("volume must be a number, got {0}")]
    InvalidVolume(f32),

    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),

    #[error("failed to load state from '{path}': {source}")]
    Load {
        path: PathBuf,
        source: Box<StoreError>,
    },
}
