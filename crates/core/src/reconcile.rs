//! Turns store state into live playback.
//!
//! Every pass makes the live set match the active scene's placements:
//! instances that are no longer wanted are stopped and destroyed first, new
//! placements get an instance, then volume, loop and play/pause are synced
//! by value. A pass that finds nothing to change issues no backend calls.

use std::collections::{BTreeMap, HashSet};

use soundboard_store::{SceneTrackId, Store, StoreState, TrackId, TrackKind};

use crate::instance::{Backend, BackendNotice, InstanceError, InstanceSettings, PlaybackInstance};

pub struct LiveEntry {
    pub track_id: TrackId,
    pub instance: Box<dyn PlaybackInstance>,
}

/// Live instances keyed by scene track id. Only the reconciler adds or
/// removes entries.
#[derive(Default)]
pub struct LiveTable {
    entries: BTreeMap<SceneTrackId, LiveEntry>,
}

impl LiveTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: SceneTrackId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = SceneTrackId> + '_ {
        self.entries.keys().copied()
    }

    pub fn get(&self, id: SceneTrackId) -> Option<&dyn PlaybackInstance> {
        self.entries.get(&id).map(|e| e.instance.as_ref())
    }

    pub fn get_mut(&mut self, id: SceneTrackId) -> Option<&mut (dyn PlaybackInstance + 'static)> {
        self.entries.get_mut(&id).map(|e| e.instance.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = (SceneTrackId, &LiveEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub(crate) fn insert(&mut self, id: SceneTrackId, entry: LiveEntry) {
        self.entries.insert(id, entry);
    }

    pub(crate) fn remove(&mut self, id: SceneTrackId) -> Option<LiveEntry> {
        self.entries.remove(&id)
    }
}

/// What one pass changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub destroyed: usize,
    pub failed: usize,
    pub commands: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

pub struct Engine {
    store: Store,
    live: LiveTable,
    local: Box<dyn Backend>,
    remote: Box<dyn Backend>,
}

impl Engine {
    pub fn new(store: Store, local: Box<dyn Backend>, remote: Box<dyn Backend>) -> Self {
        Self {
            store,
            live: LiveTable::default(),
            local,
            remote,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn live(&self) -> &LiveTable {
        &self.live
    }

    pub fn reconcile(&mut self) -> ReconcileReport {
        let state = self.store.state();
        self.reconcile_state(&state)
    }

    pub fn reconcile_state(&mut self, state: &StoreState) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let scene_playing = state.active_scene().is_some_and(|scene| scene.is_playing);
        let placements = state.active_placements();
        let desired: HashSet<SceneTrackId> = placements.iter().map(|(st, _)| st.id).collect();

        let departing: Vec<SceneTrackId> =
            self.live.ids().filter(|id| !desired.contains(id)).collect();
        for id in departing {
            if let Some(entry) = self.live.remove(id) {
                release(id, entry);
                report.destroyed += 1;
            }
        }

        for (placement, track) in &placements {
            let id = placement.id;
            if !self.live.contains(id) {
                let backend = match track.kind() {
                    TrackKind::Local => &mut self.local,
                    TrackKind::Remote => &mut self.remote,
                };
                let settings = InstanceSettings {
                    volume: placement.volume,
                    looping: placement.looping,
                };
                match backend.create(id, track, settings) {
                    Ok(instance) => {
                        tracing::debug!(%id, track = %track.name, "instance created");
                        self.live.insert(
                            id,
                            LiveEntry {
                                track_id: track.id,
                                instance,
                            },
                        );
                        report.created += 1;
                    }
                    Err(e) => {
                        tracing::warn!(%id, track = %track.name, "failed to create instance: {e}");
                        report.failed += 1;
                        continue;
                    }
                }
            }

            let Some(instance) = self.live.get_mut(id) else {
                continue;
            };
            let should_play = scene_playing && placement.is_playing;
            report.commands += sync(id, instance, placement.volume, placement.looping, should_play);
        }

        if !report.is_noop() {
            tracing::debug!(?report, live = self.live.len(), "reconciled");
        }
        report
    }

    /// Drain backend notices: back-fill unknown durations and drop instances
    /// whose backend gave up on them. Failed placements are retried on the
    /// next reconcile.
    pub fn process_backend_events(&mut self) {
        let notices: Vec<_> = self
            .local
            .poll_notices()
            .into_iter()
            .chain(self.remote.poll_notices())
            .collect();

        for notice in notices {
            match notice {
                BackendNotice::Ready { id, duration } => {
                    let Some(entry) = self.live.entries.get(&id) else {
                        continue;
                    };
                    if let Err(e) = self.store.set_track_duration(entry.track_id, duration) {
                        tracing::debug!(%id, "duration not recorded: {e}");
                    }
                }
                BackendNotice::Failed { id, reason } => {
                    tracing::warn!(%id, "playback failed: {reason}");
                }
            }
        }

        let failed: Vec<SceneTrackId> = self
            .live
            .iter()
            .filter(|(_, entry)| entry.instance.is_failed())
            .map(|(id, _)| id)
            .collect();
        for id in failed {
            if let Some(entry) = self.live.remove(id) {
                release(id, entry);
            }
        }
    }

    pub fn maintain(&mut self) {
        self.local.maintain();
        self.remote.maintain();
    }

    pub fn seek_to(&mut self, id: SceneTrackId, seconds: f64) -> bool {
        crate::seek::seek_to(&mut self.live, &self.store, id, seconds)
    }

    /// Destroy every live instance.
    pub fn shutdown(&mut self) {
        let ids: Vec<SceneTrackId> = self.live.ids().collect();
        for id in ids {
            if let Some(entry) = self.live.remove(id) {
                release(id, entry);
            }
        }
        self.maintain();
    }
}

fn release(id: SceneTrackId, mut entry: LiveEntry) {
    if entry.instance.is_playing() {
        log_failure(id, "stop", entry.instance.stop());
    }
    entry.instance.destroy();
    tracing::debug!(%id, "instance destroyed");
}

/// Bring one instance in line with its placement. Returns the number of
/// commands issued.
fn sync(
    id: SceneTrackId,
    instance: &mut dyn PlaybackInstance,
    volume: f32,
    looping: bool,
    should_play: bool,
) -> usize {
    let mut commands = 0;
    if instance.volume() != volume {
        log_failure(id, "set volume", instance.set_volume(volume));
        commands += 1;
    }
    if instance.looping() != looping {
        log_failure(id, "set loop", instance.set_loop(looping));
        commands += 1;
    }
    match (should_play, instance.is_playing()) {
        (true, false) => {
            log_failure(id, "play", instance.play());
            commands += 1;
        }
        (false, true) => {
            log_failure(id, "pause", instance.pause());
            commands += 1;
        }
        _ => {}
    }
    commands
}

fn log_failure(id: SceneTrackId, action: &str, result: Result<(), InstanceError>) {
    if let Err(e) = result {
        tracing::warn!(%id, "{action} failed: {e}");
    }
}
