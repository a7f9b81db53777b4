//! Decoding of uploaded audio blobs.
//!
//! Blobs arrive as raw bytes from the blob store, so everything here works on
//! in-memory sources. The file name extension, when known, is passed along as
//! a probe hint.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use soundboard_transport::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Extensions the soundboard accepts as local audio. WebM is left out: its
/// audio is almost always Opus, which symphonia cannot decode.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a", "aac"];

pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(ext))
}

fn open(bytes: Vec<u8>, extension: Option<&str>) -> anyhow::Result<Box<dyn FormatReader>> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    Ok(probed.format)
}

fn default_params(format: &dyn FormatReader) -> anyhow::Result<(u32, CodecParameters)> {
    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default track"))?;
    Ok((track.id, track.codec_params.clone()))
}

/// Decode a whole blob into interleaved f32 samples.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> anyhow::Result<AudioArc> {
    let mut format = open(bytes, extension)?;
    let (track_id, params) = default_params(format.as_ref())?;

    let sample_rate = params.sample_rate.unwrap_or(44100);
    let mut channels = params.channels.map(|c| c.count()).unwrap_or(0) as u16;

    let mut decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped, the rest of the stream is still usable.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count() as u16;
        }

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if channels == 0 {
        anyhow::bail!("stream has no audio channels");
    }

    Ok(AudioArc::new(samples, sample_rate, channels))
}

pub fn decode_file(path: &Path) -> anyhow::Result<AudioArc> {
    let bytes = fs::read(path)?;
    let extension = path.extension().and_then(|e| e.to_str());
    decode_bytes(bytes, extension)
}

/// Media duration in seconds.
///
/// Uses the container's frame count when it advertises one and falls back to
/// decoding the stream otherwise.
pub fn probe_duration(bytes: Vec<u8>, extension: Option<&str>) -> anyhow::Result<f64> {
    let format = open(bytes.clone(), extension)?;
    let (_, params) = default_params(format.as_ref())?;

    if let (Some(frames), Some(time_base)) = (params.n_frames, params.time_base) {
        let time = time_base.calc_time(frames);
        return Ok(time.seconds as f64 + time.frac);
    }
    if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
        if rate > 0 {
            return Ok(frames as f64 / rate as f64);
        }
    }

    drop(format);
    Ok(decode_bytes(bytes, extension)?.duration_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn wav_bytes(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        {
            let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).expect("writer");
            let frames = (sample_rate as f32 * seconds) as usize;
            for i in 0..frames {
                let value = ((i % 100) as i16 - 50) * 200;
                for _ in 0..channels {
                    writer.write_sample(value).expect("write");
                }
            }
            writer.finalize().expect("finalize");
        }
        bytes
    }

    #[test]
    fn test_decode_wav_bytes() {
        let bytes = wav_bytes(8000, 2, 0.5);
        let audio = decode_bytes(bytes, Some("wav")).expect("decode");

        assert_eq!(audio.sample_rate(), 8000);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frames(), 4000);
    }

    #[test]
    fn test_decode_without_hint() {
        let bytes = wav_bytes(8000, 1, 0.25);
        let audio = decode_bytes(bytes, None).expect("decode");
        assert_eq!(audio.frames(), 2000);
    }

    #[test]
    fn test_probe_duration() {
        let bytes = wav_bytes(8000, 1, 2.0);
        let duration = probe_duration(bytes, Some("wav")).expect("probe");
        assert!((duration - 2.0).abs() < 0.01, "got {duration}");
    }

    #[test]
    fn test_garbage_is_an_error() {
        let bytes = b"definitely not audio".to_vec();
        assert!(decode_bytes(bytes.clone(), Some("mp3")).is_err());
        assert!(probe_duration(bytes, Some("mp3")).is_err());
    }

    #[test]
    fn test_decode_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rain.wav");
        std::fs::write(&path, wav_bytes(8000, 1, 0.1)).expect("write");

        let audio = decode_file(&path).expect("decode");
        assert_eq!(audio.frames(), 800);
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension("MP3"));
        assert!(is_supported_extension("ogg"));
        assert!(!is_supported_extension("txt"));
        assert!(!is_supported_extension("webm"));
    }
}
