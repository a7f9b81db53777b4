//! Play one file through the mixer: `cargo run -p soundboard_engine --example sample -- rain.ogg`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use soundboard_transport::VoiceControl;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: sample <audio file>"))?;

    let audio = soundboard_decode::decode_file(&path)?;
    tracing::info!(?audio, "decoded {}", path.display());

    let mut engine = soundboard_engine::start()?;
    let audio = audio.resample(engine.mixer.sample_rate())?;
    let duration = audio.duration_secs();

    let control = Arc::new(VoiceControl::new(0.8, false));
    engine.mixer.add_voice(audio, control.clone())?;
    control.play();

    let sample_rate = engine.mixer.sample_rate() as f64;
    while control.is_playing() {
        std::thread::sleep(Duration::from_millis(250));
        let seconds = control.position_frames() as f64 / sample_rate;
        tracing::info!("{seconds:.2}s / {duration:.2}s");
    }

    Ok(())
}
