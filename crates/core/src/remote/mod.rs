//! Remote video audio, played through embedded players that load
//! asynchronously.
//!
//! A remote instance starts out pending. Play, pause and volume requests made
//! while pending are remembered (latest wins) and flushed once the player
//! reports ready. Seeks made while pending are dropped. The embedded player
//! has no loop flag, so looping is emulated by seeking back to the start when
//! the player reports that it ended.

mod bridge;
mod host;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use soundboard_store::{SceneTrackId, Track, TrackSource};

pub use bridge::{BridgeEndpoint, BridgeHost, HostCommand};
pub use host::{HostError, HostEvent, PlayerHost, PlayerId, PlayerState};

use crate::instance::{
    Backend, BackendNotice, InstanceError, InstanceSettings, PlaybackInstance,
};

pub type SharedHost = Rc<RefCell<dyn PlayerHost>>;

pub const DEFAULT_VOLUME_SCALE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Ready,
    Failed,
    Destroyed,
}

struct Slot {
    scene_track: SceneTrackId,
    phase: Phase,
    volume: f32,
    looping: bool,
    /// Latest play/pause request made while pending.
    wants_play: bool,
}

pub struct RemoteBackend {
    host: SharedHost,
    slots: HashMap<PlayerId, Weak<RefCell<Slot>>>,
    next_player: u64,
    volume_scale: u8,
}

impl RemoteBackend {
    pub fn new(host: impl PlayerHost + 'static, volume_scale: u8) -> Self {
        let host: SharedHost = Rc::new(RefCell::new(host));
        Self {
            host,
            slots: HashMap::new(),
            next_player: 0,
            volume_scale,
        }
    }

    fn on_ready(
        &self,
        player: PlayerId,
        slot: &RefCell<Slot>,
        duration: f64,
    ) -> Option<BackendNotice> {
        let mut slot = slot.borrow_mut();
        if slot.phase != Phase::Pending {
            return None;
        }
        slot.phase = Phase::Ready;

        let mut host = self.host.borrow_mut();
        let flushed = host
            .set_volume(player, scale_volume(slot.volume, self.volume_scale))
            .and_then(|()| {
                if slot.wants_play {
                    host.play(player)
                } else {
                    Ok(())
                }
            });
        if let Err(e) = flushed {
            tracing::warn!("failed to apply queued settings to {player}: {e}");
        }

        tracing::debug!(id = %slot.scene_track, %player, duration, "remote player ready");
        Some(BackendNotice::Ready {
            id: slot.scene_track,
            duration,
        })
    }

    fn on_ended(&self, player: PlayerId, slot: &RefCell<Slot>) {
        let slot = slot.borrow();
        if slot.phase != Phase::Ready || !slot.looping {
            return;
        }
        let mut host = self.host.borrow_mut();
        if let Err(e) = host.seek(player, 0.0).and_then(|()| host.play(player)) {
            tracing::warn!("failed to loop {player}: {e}");
        }
    }

    fn on_error(&self, player: PlayerId, slot: &RefCell<Slot>, code: i32) -> Option<BackendNotice> {
        let mut slot = slot.borrow_mut();
        if !matches!(slot.phase, Phase::Pending | Phase::Ready) {
            return None;
        }
        slot.phase = Phase::Failed;
        let reason = format!("{} (code {code})", describe_error(code));
        tracing::warn!(id = %slot.scene_track, %player, "remote player failed: {reason}");
        Some(BackendNotice::Failed {
            id: slot.scene_track,
            reason,
        })
    }
}

impl Backend for RemoteBackend {
    fn create(
        &mut self,
        id: SceneTrackId,
        track: &Track,
        settings: InstanceSettings,
    ) -> Result<Box<dyn PlaybackInstance>, InstanceError> {
        let TrackSource::Remote { video_id } = &track.source else {
            return Err(InstanceError::WrongSource(track.kind()));
        };

        let player = PlayerId(self.next_player);
        self.next_player += 1;
        self.host.borrow_mut().create(player, video_id)?;

        let slot = Rc::new(RefCell::new(Slot {
            scene_track: id,
            phase: Phase::Pending,
            volume: settings.volume,
            looping: settings.looping,
            wants_play: false,
        }));
        self.slots.insert(player, Rc::downgrade(&slot));

        tracing::debug!(%id, %player, %video_id, "remote player requested");
        Ok(Box::new(RemoteInstance {
            player,
            host: self.host.clone(),
            slot,
            volume_scale: self.volume_scale,
        }))
    }

    fn poll_notices(&mut self) -> Vec<BackendNotice> {
        let mut notices = Vec::new();
        loop {
            let event = self.host.borrow_mut().poll_event();
            let Some(event) = event else {
                break;
            };
            let player = event.player();
            let Some(slot) = self.slots.get(&player).and_then(Weak::upgrade) else {
                tracing::trace!("dropping event for released {player}");
                continue;
            };

            let notice = match event {
                HostEvent::Ready { duration, .. } => self.on_ready(player, &slot, duration),
                HostEvent::StateChange {
                    state: PlayerState::Ended,
                    ..
                } => {
                    self.on_ended(player, &slot);
                    None
                }
                HostEvent::Error { code, .. } => self.on_error(player, &slot, code),
                HostEvent::StateChange { .. } | HostEvent::Progress { .. } => None,
            };
            notices.extend(notice);
        }

        self.slots.retain(|_, slot| slot.strong_count() > 0);
        notices
    }
}

pub struct RemoteInstance {
    player: PlayerId,
    host: SharedHost,
    slot: Rc<RefCell<Slot>>,
    volume_scale: u8,
}

impl RemoteInstance {
    pub fn phase(&self) -> Phase {
        self.slot.borrow().phase
    }
}

impl PlaybackInstance for RemoteInstance {
    fn play(&mut self) -> Result<(), InstanceError> {
        match self.phase() {
            Phase::Pending => self.slot.borrow_mut().wants_play = true,
            Phase::Ready => self.host.borrow_mut().play(self.player)?,
            Phase::Failed | Phase::Destroyed => {}
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), InstanceError> {
        match self.phase() {
            Phase::Pending => self.slot.borrow_mut().wants_play = false,
            Phase::Ready => self.host.borrow_mut().pause(self.player)?,
            Phase::Failed | Phase::Destroyed => {}
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), InstanceError> {
        match self.phase() {
            Phase::Pending => self.slot.borrow_mut().wants_play = false,
            Phase::Ready => self.host.borrow_mut().stop(self.player)?,
            Phase::Failed | Phase::Destroyed => {}
        }
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<(), InstanceError> {
        if self.phase() == Phase::Ready {
            self.host.borrow_mut().seek(self.player, seconds.max(0.0))?;
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), InstanceError> {
        let phase = {
            let mut slot = self.slot.borrow_mut();
            slot.volume = volume.clamp(0.0, 1.0);
            slot.phase
        };
        if phase == Phase::Ready {
            self.host
                .borrow_mut()
                .set_volume(self.player, scale_volume(volume, self.volume_scale))?;
        }
        Ok(())
    }

    fn set_loop(&mut self, looping: bool) -> Result<(), InstanceError> {
        self.slot.borrow_mut().looping = looping;
        Ok(())
    }

    fn position(&self) -> f64 {
        if self.phase() != Phase::Ready {
            return 0.0;
        }
        self.host
            .borrow()
            .current_time(self.player)
            .unwrap_or(0.0)
    }

    fn is_playing(&self) -> bool {
        let slot = self.slot.borrow();
        match slot.phase {
            Phase::Pending => slot.wants_play,
            Phase::Ready => self
                .host
                .borrow()
                .state(self.player)
                .is_some_and(PlayerState::is_active),
            Phase::Failed | Phase::Destroyed => false,
        }
    }

    fn volume(&self) -> f32 {
        self.slot.borrow().volume
    }

    fn looping(&self) -> bool {
        self.slot.borrow().looping
    }

    fn is_ready(&self) -> bool {
        self.phase() == Phase::Ready
    }

    fn is_failed(&self) -> bool {
        self.phase() == Phase::Failed
    }

    fn destroy(&mut self) {
        {
            let mut slot = self.slot.borrow_mut();
            if slot.phase == Phase::Destroyed {
                return;
            }
            slot.phase = Phase::Destroyed;
        }
        self.host.borrow_mut().destroy(self.player);
    }
}

impl Drop for RemoteInstance {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Map a [0, 1] volume onto the player's 0..=scale range.
pub fn scale_volume(volume: f32, scale: u8) -> u8 {
    let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
    (volume * scale as f32).round() as u8
}

fn describe_error(code: i32) -> &'static str {
    match code {
        2 => "invalid video id",
        5 => "player cannot play this video",
        100 => "video not found or private",
        101 | 150 => "embedding disabled by owner",
        _ => "player error",
    }
}
