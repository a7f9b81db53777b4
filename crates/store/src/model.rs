use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::StoreError;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Library-level identity of an audio source.
    TrackId
);
id_type!(SceneId);
id_type!(
    /// Identity of one placement of a track inside a scene. The same track may
    /// be placed several times, each placement is controlled independently.
    SceneTrackId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Local,
    Remote,
}

/// Where a track's audio comes from.
///
/// Local audio lives in the blob store under the track id; `extension` is
/// kept as a decoder hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrackSource {
    #[serde(rename_all = "camelCase")]
    Local { extension: Option<String> },
    #[serde(rename_all = "camelCase")]
    Remote { video_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    /// Seconds; 0 while unknown.
    pub duration: f64,
    pub source: TrackSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Track {
    pub fn local(name: impl Into<String>, duration: f64, extension: Option<String>) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            duration,
            source: TrackSource::Local { extension },
            thumbnail: None,
        }
    }

    pub fn remote(name: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            duration: 0.0,
            source: TrackSource::Remote {
                video_id: video_id.into(),
            },
            thumbnail: None,
        }
    }

    pub fn kind(&self) -> TrackKind {
        match self.source {
            TrackSource::Local { .. } => TrackKind::Local,
            TrackSource::Remote { .. } => TrackKind::Remote,
        }
    }

    /// Key of this track's payload in the blob store.
    pub fn blob_key(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackPatch {
    pub name: Option<String>,
    pub thumbnail: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneTrack {
    pub id: SceneTrackId,
    pub source_track_id: TrackId,
    /// Always within [0, 1].
    pub volume: f32,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub is_playing: bool,
}

impl SceneTrack {
    pub fn new(source_track_id: TrackId) -> Self {
        Self {
            id: SceneTrackId::new(),
            source_track_id,
            volume: 1.0,
            looping: false,
            is_playing: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SceneTrackPatch {
    pub volume: Option<f32>,
    pub looping: Option<bool>,
    pub is_playing: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub is_playing: bool,
    pub tracks: Vec<SceneTrack>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SceneId::new(),
            name: name.into(),
            is_playing: false,
            tracks: Vec::new(),
        }
    }

    pub fn scene_track(&self, id: SceneTrackId) -> Option<&SceneTrack> {
        self.tracks.iter().find(|st| st.id == id)
    }
}

/// The persisted state tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    pub tracks: Vec<Track>,
    pub scenes: Vec<Scene>,
    pub active_scene: Option<SceneId>,
}

impl StoreState {
    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub(crate) fn scene_mut(&mut self, id: SceneId) -> Result<&mut Scene, StoreError> {
        self.scenes
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::UnknownScene(id))
    }

    pub fn active_scene(&self) -> Option<&Scene> {
        self.active_scene.and_then(|id| self.scene(id))
    }

    /// Whether `id` is placed in any scene.
    pub fn contains_scene_track(&self, id: SceneTrackId) -> bool {
        self.scenes.iter().any(|s| s.scene_track(id).is_some())
    }

    /// Active scene's placements paired with their source tracks. Placements
    /// whose track is missing are skipped.
    pub fn active_placements(&self) -> Vec<(&SceneTrack, &Track)> {
        let Some(scene) = self.active_scene() else {
            return Vec::new();
        };
        scene
            .tracks
            .iter()
            .filter_map(|st| self.track(st.source_track_id).map(|t| (st, t)))
            .collect()
    }
}

/// Clamp a volume write into [0, 1]. NaN is rejected.
pub fn clamp_volume(volume: f32) -> Result<f32, StoreError> {
    if volume.is_nan() {
        return Err(StoreError::InvalidVolume(volume));
    }
    Ok(volume.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(1.5).unwrap(), 1.0);
        assert_eq!(clamp_volume(-0.2).unwrap(), 0.0);
        assert_eq!(clamp_volume(0.3).unwrap(), 0.3);
        assert!(matches!(
            clamp_volume(f32::NAN),
            Err(StoreError::InvalidVolume(_))
        ));
    }

    #[test]
    fn test_scene_track_defaults() {
        let track = Track::local("rain", 12.0, Some("ogg".into()));
        let placement = SceneTrack::new(track.id);

        assert_ne!(placement.id.0, track.id.0);
        assert_eq!(placement.volume, 1.0);
        assert!(!placement.looping);
        assert!(placement.is_playing);
    }

    #[test]
    fn test_track_source_json_shape() {
        let track = Track::remote("Tavern", "dQw4w9WgXcQ");
        let json = serde_json::to_value(&track).unwrap();

        assert_eq!(json["source"]["type"], "remote");
        assert_eq!(json["source"]["videoId"], "dQw4w9WgXcQ");
        assert!(json.get("thumbnail").is_none());
    }

    #[test]
    fn test_scene_track_serializes_loop_field() {
        let st = SceneTrack::new(TrackId::new());
        let json = serde_json::to_value(&st).unwrap();
        assert_eq!(json["loop"], false);
        assert_eq!(json["isPlaying"], true);
    }

    #[test]
    fn test_active_placements_skip_missing_tracks() {
        let track = Track::local("wind", 3.0, None);
        let mut scene = Scene::new("Forest");
        scene.tracks.push(SceneTrack::new(track.id));
        scene.tracks.push(SceneTrack::new(TrackId::new()));

        let state = StoreState {
            tracks: vec![track.clone()],
            active_scene: Some(scene.id),
            scenes: vec![scene],
        };

        let placements = state.active_placements();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].1.id, track.id);
    }
}
