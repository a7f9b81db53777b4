//! Types shared between the control side of the soundboard and the real-time
//! audio thread.

mod audio;
mod voice;

pub use audio::{AudioArc, resample_audio_arc};
pub use voice::{VoiceControl, VoiceId};
