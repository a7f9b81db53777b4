use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Identifies one voice inside the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

const NO_SEEK: u64 = u64::MAX;

/// Transport state of a single voice, shared between the control thread and
/// the audio callback.
///
/// Everything is a plain atomic so neither side ever blocks. The control side
/// writes intent (`play`, `pause`, `set_volume`, `request_seek`, ...); the
/// audio side consumes seeks, advances `position` and reports the end of
/// non-looping media through `finish`.
#[derive(Debug)]
pub struct VoiceControl {
    playing: AtomicBool,
    looping: AtomicBool,
    /// f32 bits
    volume: AtomicU32,
    pending_seek: AtomicU64,
    position: AtomicU64,
}

impl VoiceControl {
    pub fn new(volume: f32, looping: bool) -> Self {
        Self {
            playing: AtomicBool::new(false),
            looping: AtomicBool::new(looping),
            volume: AtomicU32::new(clamp_gain(volume).to_bits()),
            pending_seek: AtomicU64::new(NO_SEEK),
            position: AtomicU64::new(0),
        }
    }

    pub fn play(&self) {
        self.playing.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.playing.store(false, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume
            .store(clamp_gain(volume).to_bits(), Ordering::Release);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Acquire))
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    pub fn looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    /// Ask the audio thread to jump to `frame`. The reported position changes
    /// immediately, and a block already in flight cannot overwrite it (see
    /// [`store_position`](Self::store_position)).
    pub fn request_seek(&self, frame: u64) {
        let frame = frame.min(NO_SEEK - 1);
        self.pending_seek.store(frame, Ordering::SeqCst);
        self.position.store(frame, Ordering::SeqCst);
    }

    /// Audio side: consume a pending seek, if any.
    pub fn take_seek(&self) -> Option<u64> {
        match self.pending_seek.swap(NO_SEEK, Ordering::SeqCst) {
            NO_SEEK => None,
            frame => Some(frame),
        }
    }

    pub fn position_frames(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Audio side: publish the playhead after a rendered block.
    ///
    /// A seek requested since the block started wins: `request_seek` marks the
    /// seek pending before it writes the position, so either the check below
    /// sees the pending seek, or the control side's position write lands after
    /// this one.
    pub fn store_position(&self, frame: u64) {
        self.position.store(frame, Ordering::SeqCst);
        let pending = self.pending_seek.load(Ordering::SeqCst);
        if pending != NO_SEEK {
            self.position.store(pending, Ordering::SeqCst);
        }
    }

    /// Audio side: the end of non-looping media was reached. The voice rewinds
    /// and stops, the way a native player does on completion.
    pub fn finish(&self) {
        self.playing.store(false, Ordering::Release);
        self.store_position(0);
    }
}

fn clamp_gain(volume: f32) -> f32 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}
