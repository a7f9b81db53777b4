//! Adding tracks to the library.

use std::path::Path;

use soundboard_store::{Store, StoreError, Track, TrackId};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("unsupported audio format '{0}'")]
    Unsupported(String),

    #[error("not a recognizable video URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

const URL_MARKERS: [&str; 4] = ["youtube.com/watch?v=", "youtu.be/", "youtube.com/embed/", "youtube.com/v/"];

/// Pull the video id out of the common YouTube URL shapes.
pub fn extract_video_id(url: &str) -> Option<&str> {
    let url = url.trim();
    let rest = URL_MARKERS
        .iter()
        .find_map(|marker| url.find(marker).map(|at| &url[at + marker.len()..]))?;
    let end = rest.find(['&', '?', '#', '/', '\n']).unwrap_or(rest.len());
    let id = &rest[..end];
    is_valid_video_id(id).then_some(id)
}

pub fn is_valid_video_id(id: &str) -> bool {
    id.len() == 11
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{video_id}/hqdefault.jpg")
}

/// Add a remote track from a pasted URL. The duration is unknown until a
/// player reports it.
pub fn add_remote(store: &Store, url: &str, name: Option<&str>) -> Result<TrackId, ImportError> {
    let video_id =
        extract_video_id(url).ok_or_else(|| ImportError::InvalidUrl(url.to_string()))?;
    let name = match name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("YouTube {video_id}"),
    };

    let mut track = Track::remote(name, video_id);
    track.thumbnail = Some(thumbnail_url(video_id));
    let id = store.add_track(track, None)?;
    tracing::info!(%id, video_id, "added remote track");
    Ok(id)
}

/// Add an uploaded file. The display name is the file name without its
/// extension. Duration probing runs off the control thread and falls back to
/// 0 (unknown) when the file cannot be probed.
pub async fn import_local(
    store: &Store,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<TrackId, ImportError> {
    let path = Path::new(file_name);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| soundboard_decode::is_supported_extension(e))
        .ok_or_else(|| ImportError::Unsupported(file_name.to_string()))?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string();

    let probe_bytes = bytes.clone();
    let probe_ext = extension.clone();
    let duration = match tokio::task::spawn_blocking(move || {
        soundboard_decode::probe_duration(probe_bytes, Some(probe_ext.as_str()))
    })
    .await
    {
        Ok(Ok(seconds)) => seconds,
        Ok(Err(e)) => {
            tracing::warn!("could not probe duration of {file_name}: {e}");
            0.0
        }
        Err(e) => {
            tracing::warn!("duration probe for {file_name} did not finish: {e}");
            0.0
        }
    };

    let id = store.add_track(Track::local(name, duration, Some(extension)), Some(&bytes))?;
    tracing::info!(%id, duration, "imported {file_name}");
    Ok(id)
}

pub async fn import_file(store: &Store, path: &Path) -> Result<TrackId, ImportError> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ImportError::Unsupported(path.display().to_string()))?;
    import_local(store, file_name, bytes).await
}
