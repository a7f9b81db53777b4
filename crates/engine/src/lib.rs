//! Real-time mixer for local sources.
//!
//! Every local playback instance owns one voice. Voices are handed to the
//! audio thread through a lock-free ring and reclaimed off the audio thread
//! through a `basedrop` collector, so the callback never frees decode buffers.

use std::sync::Arc;

use basedrop::{Collector, Handle, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use soundboard_transport::{AudioArc, VoiceControl, VoiceId};

const COMMAND_CAPACITY: usize = 256;
pub const VOICE_CAPACITY: usize = 128;
/// Scratch size when the device does not fix its buffer size. Larger
/// callbacks are rendered in several passes.
const DEFAULT_BLOCK_FRAMES: usize = 4096;

/// Decoded audio plus its transport block, as seen by the audio thread.
pub struct Voice {
    pub audio: AudioArc,
    pub control: Arc<VoiceControl>,
}

pub enum Command {
    Add { id: VoiceId, voice: Shared<Voice> },
    Remove { id: VoiceId },
}

/// Control-thread side of the mixer.
pub struct MixerHandle {
    commands: rtrb::Producer<Command>,
    collector: Collector,
    handle: Handle,
    sample_rate: u32,
    next_id: u64,
    /// Voices added and not yet sent a `Remove`.
    active: usize,
    /// Removals that did not fit in the ring. Retried by `collect`.
    deferred: Vec<VoiceId>,
}

impl MixerHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn active_voices(&self) -> usize {
        self.active
    }

    /// Register a voice. `audio` must already be at the mixer's sample rate.
    /// Fails once [`VOICE_CAPACITY`] voices are registered, so the audio
    /// thread never grows its voice list.
    pub fn add_voice(
        &mut self,
        audio: AudioArc,
        control: Arc<VoiceControl>,
    ) -> anyhow::Result<VoiceId> {
        anyhow::ensure!(
            audio.sample_rate() == self.sample_rate,
            "voice sample rate {} does not match mixer rate {}",
            audio.sample_rate(),
            self.sample_rate
        );
        anyhow::ensure!(
            self.active < VOICE_CAPACITY,
            "mixer is full ({VOICE_CAPACITY} voices)"
        );

        let id = VoiceId(self.next_id);
        let voice = Shared::new(&self.handle, Voice { audio, control });
        self.commands
            .push(Command::Add { id, voice })
            .map_err(|_| anyhow::anyhow!("mixer command queue is full"))?;
        self.next_id += 1;
        self.active += 1;
        Ok(id)
    }

    /// Unregister a voice. When the command ring is full the removal is kept
    /// and sent again by the next [`collect`](Self::collect).
    pub fn remove_voice(&mut self, id: VoiceId) {
        if self.commands.push(Command::Remove { id }).is_ok() {
            self.active = self.active.saturating_sub(1);
        } else {
            tracing::debug!(?id, "mixer command queue is full, deferring removal");
            self.deferred.push(id);
        }
    }

    pub fn pending_removals(&self) -> usize {
        self.deferred.len()
    }

    /// Send deferred removals and free voices the audio thread has let go of.
    pub fn collect(&mut self) {
        while let Some(&id) = self.deferred.first() {
            if self.commands.push(Command::Remove { id }).is_err() {
                break;
            }
            self.deferred.remove(0);
            self.active = self.active.saturating_sub(1);
        }
        self.collector.collect();
    }
}

/// Audio-thread side of the mixer.
pub struct Mixer {
    commands: rtrb::Consumer<Command>,
    voices: Vec<(VoiceId, Shared<Voice>)>,
    channels: usize,
}

/// Create a mixer pair without opening a device. The caller drives
/// [`Mixer::render`] itself.
pub fn mixer(sample_rate: u32, channels: u16) -> (MixerHandle, Mixer) {
    let collector = Collector::new();
    let handle = collector.handle();
    let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(COMMAND_CAPACITY);

    (
        MixerHandle {
            commands: command_tx,
            collector,
            handle,
            sample_rate,
            next_id: 0,
            active: 0,
            deferred: Vec::new(),
        },
        Mixer {
            commands: command_rx,
            voices: Vec::with_capacity(VOICE_CAPACITY),
            channels: channels.max(1) as usize,
        },
    )
}

impl Mixer {
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Mix every playing voice into `out` (interleaved, `channels` wide).
    pub fn render(&mut self, out: &mut [f32]) {
        while let Ok(command) = self.commands.pop() {
            match command {
                // never grows: `add_voice` stops at VOICE_CAPACITY
                Command::Add { id, voice } => self.voices.push((id, voice)),
                Command::Remove { id } => self.voices.retain(|(voice_id, _)| *voice_id != id),
            }
        }

        out.fill(0.0);
        let channels = self.channels;

        for (_, voice) in &self.voices {
            let control = &voice.control;
            let total = voice.audio.frames();
            let mut position = control
                .take_seek()
                .unwrap_or_else(|| control.position_frames()) as usize;

            if !control.is_playing() {
                control.store_position(position as u64);
                continue;
            }

            let gain = control.volume();
            let mut finished = false;

            for frame in out.chunks_mut(channels) {
                if position >= total {
                    if control.looping() && total > 0 {
                        position = 0;
                    } else {
                        finished = true;
                        break;
                    }
                }
                for (ch, sample) in frame.iter_mut().enumerate() {
                    *sample += voice.audio.sample_folded(position, ch) * gain;
                }
                position += 1;
            }

            if finished {
                control.finish();
            } else {
                control.store_position(position as u64);
            }
        }
    }
}

/// A mixer bound to the default output device.
pub struct AudioEngineHandle {
    pub mixer: MixerHandle,
    _stream: cpal::Stream,
}

pub fn start() -> anyhow::Result<AudioEngineHandle> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

    let config = device.default_output_config()?;
    let stream_config: cpal::StreamConfig = config.clone().into();
    let (handle, mixer) = mixer(stream_config.sample_rate.0, stream_config.channels);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, mixer)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, mixer)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, mixer)?,
        sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
    };

    stream.play()?;
    tracing::info!(
        sample_rate = stream_config.sample_rate.0,
        channels = stream_config.channels,
        "audio output started"
    );

    Ok(AudioEngineHandle {
        mixer: handle,
        _stream: stream,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let frames = match config.buffer_size {
        cpal::BufferSize::Fixed(frames) => frames as usize,
        cpal::BufferSize::Default => DEFAULT_BLOCK_FRAMES,
    };
    let mut scratch = vec![0.0f32; frames.max(1) * mixer.channels()];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            render_into(&mut mixer, &mut scratch, data);
        },
        |err| tracing::error!("stream error: {err}"),
        None,
    )?;

    Ok(stream)
}

/// Render `data` through `scratch` without allocating. `scratch` must hold a
/// whole number of frames.
fn render_into<T>(mixer: &mut Mixer, scratch: &mut [f32], data: &mut [T])
where
    T: SizedSample + FromSample<f32>,
{
    for chunk in data.chunks_mut(scratch.len()) {
        let block = &mut scratch[..chunk.len()];
        mixer.render(block);
        for (out, sample) in chunk.iter_mut().zip(block.iter()) {
            *out = T::from_sample(sample.clamp(-1.0, 1.0));
        }
    }
}
