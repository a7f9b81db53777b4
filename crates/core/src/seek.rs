use soundboard_store::{SceneTrackId, Store};

use crate::reconcile::LiveTable;

/// Move the playhead of the live instance for `id`.
///
/// Missing or still-loading instances are left alone. The position the
/// backend settled on (which may be clamped to the media length) is recorded
/// right away so readers never see the pre-seek value. Playback resumes if the
/// backend paused as a side effect of seeking.
pub fn seek_to(live: &mut LiveTable, store: &Store, id: SceneTrackId, seconds: f64) -> bool {
    if !seconds.is_finite() {
        tracing::debug!(%id, seconds, "ignoring seek to non-finite position");
        return false;
    }
    let Some(instance) = live.get_mut(id) else {
        tracing::debug!(%id, "seek ignored: no live instance");
        return false;
    };
    if !instance.is_ready() {
        tracing::debug!(%id, "seek ignored: instance still loading");
        return false;
    }

    let seconds = seconds.max(0.0);
    let was_playing = instance.is_playing();
    if let Err(e) = instance.seek(seconds) {
        tracing::warn!(%id, "seek failed: {e}");
        return false;
    }
    store.record_position(id, instance.position());

    if was_playing && !instance.is_playing() {
        if let Err(e) = instance.play() {
            tracing::warn!(%id, "resume after seek failed: {e}");
        }
    }
    true
}
