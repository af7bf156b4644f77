//! Persistence collaborators for whole-world snapshots.
//!
//! The engine hands a [`WorldSnapshot`] to a [`WorldStorage`] and gets one
//! back on load; the storage decides medium and format.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use world_schema::{
    decode_snapshot, decode_snapshot_json, encode_snapshot, encode_snapshot_json, hash_snapshot,
    SnapshotCodecError, WorldSnapshot,
};

/// Identifies bincode snapshot files.
const MAGIC: &[u8; 4] = b"GRWD";
const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Codec(#[from] SnapshotCodecError),
    #[error("unrecognised snapshot file {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub trait WorldStorage: Send + Sync {
    fn save(&self, snapshot: &WorldSnapshot) -> Result<(), StorageError>;

    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<WorldSnapshot>, StorageError>;
}

/// Pretty-printed JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorldStorage for JsonFileStorage {
    fn save(&self, snapshot: &WorldSnapshot) -> Result<(), StorageError> {
        let json = encode_snapshot_json(snapshot)?;
        write_atomically(&self.path, json.as_bytes())
    }

    fn load(&self) -> Result<Option<WorldSnapshot>, StorageError> {
        let Some(bytes) = read_if_exists(&self.path)? else {
            return Ok(None);
        };
        let text = String::from_utf8(bytes).map_err(|err| StorageError::Format {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        let snapshot = decode_snapshot_json(&text)?;
        check_hash(&self.path, &snapshot);
        Ok(Some(snapshot))
    }
}

/// Compact bincode file with a magic and version prefix.
#[derive(Debug, Clone)]
pub struct BincodeFileStorage {
    path: PathBuf,
}

impl BincodeFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorldStorage for BincodeFileStorage {
    fn save(&self, snapshot: &WorldSnapshot) -> Result<(), StorageError> {
        let encoded = encode_snapshot(snapshot)?;
        let mut frame = Vec::with_capacity(MAGIC.len() + 1 + encoded.len());
        frame.extend_from_slice(MAGIC);
        frame.push(FORMAT_VERSION);
        frame.extend_from_slice(&encoded);
        write_atomically(&self.path, &frame)
    }

    fn load(&self) -> Result<Option<WorldSnapshot>, StorageError> {
        let Some(bytes) = read_if_exists(&self.path)? else {
            return Ok(None);
        };
        let format_error = |reason: &str| StorageError::Format {
            path: self.path.clone(),
            reason: reason.to_string(),
        };
        let body = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| format_error("missing magic bytes"))?;
        let (&version, payload) = body
            .split_first()
            .ok_or_else(|| format_error("missing format version"))?;
        if version != FORMAT_VERSION {
            return Err(format_error(&format!("unsupported format version {version}")));
        }
        let snapshot = decode_snapshot(payload)?;
        check_hash(&self.path, &snapshot);
        Ok(Some(snapshot))
    }
}

/// Keeps the last saved snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<WorldSnapshot>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: WorldSnapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
        }
    }

    pub fn stored(&self) -> Option<WorldSnapshot> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl WorldStorage for MemoryStorage {
    fn save(&self, snapshot: &WorldSnapshot) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<WorldSnapshot>, StorageError> {
        Ok(self.stored())
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StorageError::io(path, err)),
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp).map_err(|err| StorageError::io(&tmp, err))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|err| StorageError::io(&tmp, err))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|err| StorageError::io(path, err))
}

/// Hand-edited files are accepted; a stale hash is only reported.
fn check_hash(path: &Path, snapshot: &WorldSnapshot) {
    if snapshot.header.hash == 0 {
        return;
    }
    match hash_snapshot(snapshot) {
        Ok(hash) if hash == snapshot.header.hash => {}
        Ok(hash) => tracing::warn!(
            target: "grid_world::engine",
            path = %path.display(),
            stored = snapshot.header.hash,
            computed = hash,
            "snapshot.hash_mismatch"
        ),
        Err(err) => tracing::warn!(
            target: "grid_world::engine",
            path = %path.display(),
            error = %err,
            "snapshot.hash_failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use world_schema::{ObstacleState, Position};

    use super::*;

    fn snapshot() -> WorldSnapshot {
        WorldSnapshot::new(
            1_700_000_000_000,
            Vec::new(),
            vec![ObstacleState::new("rock", Position::planar(2.0, 3.0))],
        )
        .finalize()
        .unwrap()
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("nested").join("world.json"));
        assert!(storage.load().unwrap().is_none());

        storage.save(&snapshot()).unwrap();
        assert_eq!(storage.load().unwrap(), Some(snapshot()));
        let text = fs::read_to_string(storage.path()).unwrap();
        assert!(text.contains("\"saved_at_ms\": 1700000000000"));
    }

    #[test]
    fn bincode_file_round_trip_and_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("world.bin");
        let storage = BincodeFileStorage::new(&path);
        storage.save(&snapshot()).unwrap();
        assert_eq!(storage.load().unwrap(), Some(snapshot()));

        fs::write(&path, b"nope").unwrap();
        assert!(matches!(
            storage.load(),
            Err(StorageError::Format { .. })
        ));
    }

    #[test]
    fn corrupt_json_is_a_codec_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("world.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonFileStorage::new(&path).load(),
            Err(StorageError::Codec(_))
        ));
    }

    #[test]
    fn memory_storage_keeps_last_save() {
        let storage = MemoryStorage::new();
        assert!(storage.load().unwrap().is_none());
        storage.save(&snapshot()).unwrap();
        assert_eq!(storage.stored(), Some(snapshot()));
    }
}
