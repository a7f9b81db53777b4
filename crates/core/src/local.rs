//! Local audio: decoded once per track, mixed in-process.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use soundboard_engine::MixerHandle;
use soundboard_store::{SceneTrackId, Store, Track, TrackId, TrackSource};
use soundboard_transport::{AudioArc, VoiceControl, VoiceId};

use crate::instance::{Backend, InstanceError, InstanceSettings, PlaybackInstance};

pub type SharedMixer = Rc<RefCell<MixerHandle>>;

pub struct LocalBackend {
    mixer: SharedMixer,
    store: Store,
    /// Resampled audio per track, shared by every placement of that track.
    decoded: HashMap<TrackId, AudioArc>,
}

impl LocalBackend {
    pub fn new(mixer: MixerHandle, store: Store) -> Self {
        Self {
            mixer: Rc::new(RefCell::new(mixer)),
            store,
            decoded: HashMap::new(),
        }
    }

    fn audio_for(
        &mut self,
        track: &Track,
        extension: Option<&str>,
    ) -> Result<AudioArc, InstanceError> {
        if let Some(audio) = self.decoded.get(&track.id) {
            return Ok(audio.clone());
        }

        let bytes = self.store.blob(track.id)?;
        let sample_rate = self.mixer.borrow().sample_rate();
        let audio = soundboard_decode::decode_bytes(bytes, extension)
            .and_then(|audio| audio.resample(sample_rate))
            .map_err(InstanceError::Decode)?;
        tracing::debug!(track = %track.name, frames = audio.frames(), "decoded local track");
        self.decoded.insert(track.id, audio.clone());
        Ok(audio)
    }
}

impl Backend for LocalBackend {
    fn create(
        &mut self,
        id: SceneTrackId,
        track: &Track,
        settings: InstanceSettings,
    ) -> Result<Box<dyn PlaybackInstance>, InstanceError> {
        let TrackSource::Local { extension } = &track.source else {
            return Err(InstanceError::WrongSource(track.kind()));
        };

        let audio = self.audio_for(track, extension.as_deref())?;
        let sample_rate = audio.sample_rate();
        let duration = audio.duration_secs();

        let control = Arc::new(VoiceControl::new(settings.volume, settings.looping));
        let voice = self
            .mixer
            .borrow_mut()
            .add_voice(audio, control.clone())
            .map_err(InstanceError::Mixer)?;

        tracing::debug!(%id, track = %track.name, duration, "local voice created");
        Ok(Box::new(LocalInstance {
            voice: Some(voice),
            control,
            mixer: self.mixer.clone(),
            sample_rate,
            duration,
        }))
    }

    fn maintain(&mut self) {
        let store = &self.store;
        self.decoded.retain(|id, _| store.track(*id).is_some());
        self.mixer.borrow_mut().collect();
    }
}

pub struct LocalInstance {
    /// `None` once destroyed.
    voice: Option<VoiceId>,
    control: Arc<VoiceControl>,
    mixer: SharedMixer,
    sample_rate: u32,
    duration: f64,
}

impl LocalInstance {
    fn alive(&self) -> bool {
        self.voice.is_some()
    }
}

impl PlaybackInstance for LocalInstance {
    fn play(&mut self) -> Result<(), InstanceError> {
        if self.alive() {
            self.control.play();
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), InstanceError> {
        if self.alive() {
            self.control.pause();
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), InstanceError> {
        if self.alive() {
            self.control.pause();
            self.control.request_seek(0);
        }
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<(), InstanceError> {
        if self.alive() {
            let seconds = seconds.clamp(0.0, self.duration);
            self.control
                .request_seek((seconds * self.sample_rate as f64) as u64);
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), InstanceError> {
        if self.alive() {
            self.control.set_volume(volume);
        }
        Ok(())
    }

    fn set_loop(&mut self, looping: bool) -> Result<(), InstanceError> {
        if self.alive() {
            self.control.set_looping(looping);
        }
        Ok(())
    }

    fn position(&self) -> f64 {
        if !self.alive() {
            return 0.0;
        }
        self.control.position_frames() as f64 / self.sample_rate as f64
    }

    fn is_playing(&self) -> bool {
        self.alive() && self.control.is_playing()
    }

    fn volume(&self) -> f32 {
        self.control.volume()
    }

    fn looping(&self) -> bool {
        self.control.looping()
    }

    fn destroy(&mut self) {
        let Some(voice) = self.voice.take() else {
            return;
        };
        self.control.pause();
        self.mixer.borrow_mut().remove_voice(voice);
    }
}

impl Drop for LocalInstance {
    fn drop(&mut self) {
        self.destroy();
    }
}
