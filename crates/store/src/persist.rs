use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::{StoreError, StoreState};

/// Read a saved state tree. JSON is tried first, MessagePack second.
pub fn load_state(path: &Path) -> Result<StoreState, StoreError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).or_else(|_| {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        rmp_serde::decode::from_read(reader).map_err(|e| StoreError::Load {
            path: path.to_path_buf(),
            source: Box::new(e.into()),
        })
    })
}

/// Write the state tree as pretty JSON. Audio blobs and playback positions
/// are not part of it.
pub fn save_state(path: &Path, state: &StoreState) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, state)?;
    Ok(())
}
