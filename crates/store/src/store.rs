use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::model::{
    Scene, SceneId, SceneTrack, SceneTrackId, SceneTrackPatch, StoreState, Track, TrackId,
    TrackKind, TrackPatch, clamp_volume,
};
use crate::{BlobStore, MemoryBlobStore, StoreError, persist};

/// Shared state container with an observable change feed.
///
/// Every structural mutation bumps a revision counter observed through
/// [`Store::subscribe`]. Playback positions live in a separate map whose
/// writes do not bump the revision, so the position poller never wakes the
/// reconciler.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<StoreState>,
    positions: Mutex<HashMap<SceneTrackId, f64>>,
    blobs: Arc<dyn BlobStore>,
    revision: watch::Sender<u64>,
}

impl Store {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_state(StoreState::default(), blobs)
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBlobStore::new()))
    }

    /// Scenes never resume playing on their own: every `is_playing` flag is
    /// cleared.
    pub fn with_state(mut state: StoreState, blobs: Arc<dyn BlobStore>) -> Self {
        for scene in &mut state.scenes {
            scene.is_playing = false;
        }
        if let Some(active) = state.active_scene {
            if state.scene(active).is_none() {
                state.active_scene = None;
            }
        }

        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                positions: Mutex::new(HashMap::new()),
                blobs,
                revision,
            }),
        }
    }

    pub fn load(path: &Path, blobs: Arc<dyn BlobStore>) -> Result<Self, StoreError> {
        let state = persist::load_state(path)?;
        Ok(Self::with_state(state, blobs))
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        persist::save_state(path, &self.state())
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_positions(&self) -> MutexGuard<'_, HashMap<SceneTrackId, f64>> {
        self.inner
            .positions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let result = {
            let mut state = self.lock();
            let result = f(&mut state)?;
            self.prune_positions(&state);
            result
        };
        self.inner.revision.send_modify(|revision| *revision += 1);
        Ok(result)
    }

    fn prune_positions(&self, state: &StoreState) {
        self.lock_positions()
            .retain(|id, _| state.contains_scene_track(*id));
    }

    /// Snapshot of the whole state tree.
    pub fn state(&self) -> StoreState {
        self.lock().clone()
    }

    pub fn track(&self, id: TrackId) -> Option<Track> {
        self.lock().track(id).cloned()
    }

    pub fn scene(&self, id: SceneId) -> Option<Scene> {
        self.lock().scene(id).cloned()
    }

    pub fn active_scene_id(&self) -> Option<SceneId> {
        self.lock().active_scene
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Raw audio of a local track.
    pub fn blob(&self, id: TrackId) -> Result<Vec<u8>, StoreError> {
        Ok(self.inner.blobs.get(&id.to_string())?)
    }

    // Tracks

    /// Add a track to the library. Local tracks must come with their audio,
    /// which is written to the blob store first.
    pub fn add_track(&self, track: Track, payload: Option<&[u8]>) -> Result<TrackId, StoreError> {
        let id = track.id;
        if self.lock().track(id).is_some() {
            return Err(StoreError::DuplicateTrack(id));
        }
        if track.kind() == TrackKind::Local {
            let bytes = payload.ok_or(StoreError::MissingPayload(id))?;
            self.inner.blobs.put(&track.blob_key(), bytes)?;
        }

        self.mutate(|state| {
            if state.track(id).is_some() {
                return Err(StoreError::DuplicateTrack(id));
            }
            debug!(track = %id, name = %track.name, "track added");
            state.tracks.push(track);
            Ok(id)
        })
    }

    /// Remove a track and every placement of it, in every scene.
    pub fn remove_track(&self, id: TrackId) -> Result<(), StoreError> {
        let track = self.track(id).ok_or(StoreError::UnknownTrack(id))?;
        if track.kind() == TrackKind::Local {
            self.inner.blobs.delete(&track.blob_key())?;
        }

        self.mutate(|state| {
            state.tracks.retain(|t| t.id != id);
            for scene in &mut state.scenes {
                scene.tracks.retain(|st| st.source_track_id != id);
            }
            debug!(track = %id, "track removed");
            Ok(())
        })
    }

    pub fn update_track(&self, id: TrackId, patch: TrackPatch) -> Result<(), StoreError> {
        self.mutate(|state| {
            let track = state
                .tracks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(StoreError::UnknownTrack(id))?;
            if let Some(name) = patch.name {
                track.name = name;
            }
            if let Some(thumbnail) = patch.thumbnail {
                track.thumbnail = thumbnail;
            }
            Ok(())
        })
    }

    /// Back-fill a duration resolved by a playback backend. Only an unknown
    /// (zero) duration is overwritten. Returns whether the track changed.
    pub fn set_track_duration(&self, id: TrackId, seconds: f64) -> Result<bool, StoreError> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Ok(false);
        }
        {
            let state = self.lock();
            let track = state.track(id).ok_or(StoreError::UnknownTrack(id))?;
            if track.duration > 0.0 {
                return Ok(false);
            }
        }
        self.mutate(|state| {
            let Some(track) = state.tracks.iter_mut().find(|t| t.id == id) else {
                return Err(StoreError::UnknownTrack(id));
            };
            if track.duration > 0.0 {
                return Ok(false);
            }
            track.duration = seconds;
            debug!(track = %id, seconds, "duration back-filled");
            Ok(true)
        })
    }

    // Scenes

    pub fn create_scene(&self, name: impl Into<String>) -> Result<SceneId, StoreError> {
        let scene = Scene::new(name);
        let id = scene.id;
        self.mutate(|state| {
            state.scenes.push(scene);
            Ok(id)
        })
    }

    pub fn rename_scene(&self, id: SceneId, name: impl Into<String>) -> Result<(), StoreError> {
        let name = name.into();
        self.mutate(|state| {
            state.scene_mut(id)?.name = name;
            Ok(())
        })
    }

    pub fn delete_scene(&self, id: SceneId) -> Result<(), StoreError> {
        self.mutate(|state| {
            state.scene_mut(id)?;
            state.scenes.retain(|s| s.id != id);
            if state.active_scene == Some(id) {
                state.active_scene = None;
            }
            Ok(())
        })
    }

    /// Make `id` the active scene (or none). The previously active scene is
    /// stopped in the same transition.
    pub fn set_active_scene(&self, id: Option<SceneId>) -> Result<(), StoreError> {
        self.mutate(|state| activate(state, id))
    }

    /// Starting a scene that is not active switches to it, so at most one
    /// scene is ever marked playing.
    pub fn set_scene_playing(&self, id: SceneId, playing: bool) -> Result<(), StoreError> {
        self.mutate(|state| {
            state.scene_mut(id)?;
            if playing && state.active_scene != Some(id) {
                activate(state, Some(id))?;
            }
            state.scene_mut(id)?.is_playing = playing;
            Ok(())
        })
    }

    /// Scene play button: stops the scene if it is the active, playing one,
    /// otherwise switches to it and starts it. Returns the new playing flag.
    pub fn toggle_scene_playback(&self, id: SceneId) -> Result<bool, StoreError> {
        self.mutate(|state| {
            let playing = state.scene_mut(id)?.is_playing;
            if state.active_scene == Some(id) && playing {
                state.scene_mut(id)?.is_playing = false;
                return Ok(false);
            }
            activate(state, Some(id))?;
            state.scene_mut(id)?.is_playing = true;
            Ok(true)
        })
    }

    // Placements

    pub fn add_track_to_scene(
        &self,
        scene: SceneId,
        track: TrackId,
    ) -> Result<SceneTrackId, StoreError> {
        self.mutate(|state| {
            if state.track(track).is_none() {
                return Err(StoreError::UnknownTrack(track));
            }
            let placement = SceneTrack::new(track);
            let id = placement.id;
            state.scene_mut(scene)?.tracks.push(placement);
            Ok(id)
        })
    }

    pub fn remove_track_from_scene(
        &self,
        scene: SceneId,
        scene_track: SceneTrackId,
    ) -> Result<(), StoreError> {
        self.mutate(|state| {
            let scene = state.scene_mut(scene)?;
            let before = scene.tracks.len();
            scene.tracks.retain(|st| st.id != scene_track);
            if scene.tracks.len() == before {
                return Err(StoreError::UnknownSceneTrack(scene_track));
            }
            Ok(())
        })
    }

    /// Volume is clamped into [0, 1] here, before it reaches any backend.
    pub fn update_scene_track(
        &self,
        scene: SceneId,
        scene_track: SceneTrackId,
        patch: SceneTrackPatch,
    ) -> Result<(), StoreError> {
        let volume = patch.volume.map(clamp_volume).transpose()?;
        self.mutate(|state| {
            let placement = state
                .scene_mut(scene)?
                .tracks
                .iter_mut()
                .find(|st| st.id == scene_track)
                .ok_or(StoreError::UnknownSceneTrack(scene_track))?;
            if let Some(volume) = volume {
                placement.volume = volume;
            }
            if let Some(looping) = patch.looping {
                placement.looping = looping;
            }
            if let Some(is_playing) = patch.is_playing {
                placement.is_playing = is_playing;
            }
            Ok(())
        })
    }

    // Playback positions

    /// Record a playback position. Ids that are no longer placed in any
    /// scene are ignored so a late poll cannot resurrect a removed entry.
    pub fn record_position(&self, id: SceneTrackId, seconds: f64) -> bool {
        let state = self.lock();
        if !state.contains_scene_track(id) {
            return false;
        }
        self.lock_positions().insert(id, seconds.max(0.0));
        true
    }

    /// Seconds elapsed for `id`, 0 when unknown.
    pub fn position(&self, id: SceneTrackId) -> f64 {
        self.lock_positions().get(&id).copied().unwrap_or(0.0)
    }

    pub fn positions(&self) -> HashMap<SceneTrackId, f64> {
        self.lock_positions().clone()
    }
}

fn activate(state: &mut StoreState, id: Option<SceneId>) -> Result<(), StoreError> {
    if let Some(id) = id {
        state.scene_mut(id)?;
    }
    if state.active_scene == id {
        return Ok(());
    }
    if let Some(previous) = state.active_scene {
        if let Ok(scene) = state.scene_mut(previous) {
            scene.is_playing = false;
        }
    }
    debug!(from = ?state.active_scene, to = ?id, "active scene switched");
    state.active_scene = id;
    Ok(())
}
