//! Test doubles shared by the unit tests in this crate.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::rc::Rc;

use hound::{SampleFormat, WavSpec, WavWriter};
use soundboard_store::{SceneTrackId, Track};

use crate::instance::{
    Backend, BackendNotice, InstanceError, InstanceSettings, PlaybackInstance,
};

/// Mono 16-bit WAV with a quiet sawtooth.
pub fn wav_bytes(sample_rate: u32, seconds: f32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).expect("writer");
        let frames = (sample_rate as f32 * seconds) as usize;
        for i in 0..frames {
            writer
                .write_sample(((i % 100) as i16 - 50) * 100)
                .expect("sample");
        }
        writer.finalize().expect("finalize");
    }
    bytes
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create,
    Play,
    Pause,
    Stop,
    Seek(f64),
    Volume(f32),
    Loop(bool),
    Destroy,
}

#[derive(Debug)]
struct FakeState {
    playing: bool,
    volume: f32,
    looping: bool,
    position: f64,
    ready: bool,
    failed: bool,
    destroyed: bool,
}

#[derive(Default)]
struct Shared {
    log: Vec<(SceneTrackId, Call)>,
    fail_create: HashSet<SceneTrackId>,
    notices: Vec<BackendNotice>,
    instances: HashMap<SceneTrackId, Rc<RefCell<FakeState>>>,
    start_pending: bool,
    seek_pauses: bool,
}

/// Backend whose instances only record what was asked of them. Clones share
/// the same log.
#[derive(Clone, Default)]
pub struct FakeBackend {
    shared: Rc<RefCell<Shared>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// New instances start not ready, like a remote player still loading.
    pub fn pending() -> Self {
        let backend = Self::default();
        backend.shared.borrow_mut().start_pending = true;
        backend
    }

    /// Seeking pauses playback, the way some embedded players behave.
    pub fn seek_pauses(self) -> Self {
        self.shared.borrow_mut().seek_pauses = true;
        self
    }

    pub fn log(&self) -> Vec<(SceneTrackId, Call)> {
        self.shared.borrow().log.clone()
    }

    pub fn calls(&self, id: SceneTrackId) -> Vec<Call> {
        self.shared
            .borrow()
            .log
            .iter()
            .filter(|(logged, _)| *logged == id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.shared.borrow().log.len()
    }

    /// Instances that are alive and audible.
    pub fn playing_count(&self) -> usize {
        self.shared
            .borrow()
            .instances
            .values()
            .filter(|s| {
                let s = s.borrow();
                s.playing && !s.destroyed
            })
            .count()
    }

    pub fn fail_next_create(&self, id: SceneTrackId) {
        self.shared.borrow_mut().fail_create.insert(id);
    }

    pub fn fail(&self, id: SceneTrackId) {
        if let Some(state) = self.shared.borrow().instances.get(&id) {
            state.borrow_mut().failed = true;
        }
    }

    pub fn notify_ready(&self, id: SceneTrackId, duration: f64) {
        let mut shared = self.shared.borrow_mut();
        if let Some(state) = shared.instances.get(&id) {
            state.borrow_mut().ready = true;
        }
        shared.notices.push(BackendNotice::Ready { id, duration });
    }

    /// Move the playhead as if audio had been rendered.
    pub fn advance(&self, id: SceneTrackId, seconds: f64) {
        if let Some(state) = self.shared.borrow().instances.get(&id) {
            let mut state = state.borrow_mut();
            if state.playing {
                state.position += seconds;
            }
        }
    }
}

impl Backend for FakeBackend {
    fn create(
        &mut self,
        id: SceneTrackId,
        _track: &Track,
        settings: InstanceSettings,
    ) -> Result<Box<dyn PlaybackInstance>, InstanceError> {
        let mut shared = self.shared.borrow_mut();
        if shared.fail_create.remove(&id) {
            return Err(InstanceError::Decode(anyhow::anyhow!("unreadable payload")));
        }
        shared.log.push((id, Call::Create));
        let state = Rc::new(RefCell::new(FakeState {
            playing: false,
            volume: settings.volume,
            looping: settings.looping,
            position: 0.0,
            ready: !shared.start_pending,
            failed: false,
            destroyed: false,
        }));
        shared.instances.insert(id, state.clone());
        Ok(Box::new(FakeInstance {
            id,
            state,
            shared: self.shared.clone(),
        }))
    }

    fn poll_notices(&mut self) -> Vec<BackendNotice> {
        std::mem::take(&mut self.shared.borrow_mut().notices)
    }
}

pub struct FakeInstance {
    id: SceneTrackId,
    state: Rc<RefCell<FakeState>>,
    shared: Rc<RefCell<Shared>>,
}

impl FakeInstance {
    /// Log `call` and apply it unless destroyed.
    fn record(&self, call: Call, apply: impl FnOnce(&mut FakeState)) {
        let mut state = self.state.borrow_mut();
        if state.destroyed {
            return;
        }
        self.shared.borrow_mut().log.push((self.id, call));
        apply(&mut state);
    }
}

impl PlaybackInstance for FakeInstance {
    fn play(&mut self) -> Result<(), InstanceError> {
        self.record(Call::Play, |s| s.playing = true);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), InstanceError> {
        self.record(Call::Pause, |s| s.playing = false);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), InstanceError> {
        self.record(Call::Stop, |s| {
            s.playing = false;
            s.position = 0.0;
        });
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<(), InstanceError> {
        let pauses = self.shared.borrow().seek_pauses;
        self.record(Call::Seek(seconds), |s| {
            s.position = seconds;
            if pauses {
                s.playing = false;
            }
        });
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), InstanceError> {
        self.record(Call::Volume(volume), |s| s.volume = volume);
        Ok(())
    }

    fn set_loop(&mut self, looping: bool) -> Result<(), InstanceError> {
        self.record(Call::Loop(looping), |s| s.looping = looping);
        Ok(())
    }

    fn position(&self) -> f64 {
        self.state.borrow().position
    }

    fn is_playing(&self) -> bool {
        let s = self.state.borrow();
        s.playing && !s.destroyed
    }

    fn volume(&self) -> f32 {
        self.state.borrow().volume
    }

    fn looping(&self) -> bool {
        self.state.borrow().looping
    }

    fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    fn is_failed(&self) -> bool {
        self.state.borrow().failed
    }

    fn destroy(&mut self) {
        self.record(Call::Destroy, |s| {
            s.playing = false;
            s.destroyed = true;
        });
    }
}
