//! Best-effort persistence of the last camera position.
//!
//! Values are stored as JSON strings under a key, the way a browser's local
//! storage holds them. Callers treat every failure as non-fatal.

use freepark_core::config::StorageConfig;
use freepark_core::error::{CollaboratorError, Result};
use freepark_core::types::Camera;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key-value storage for camera positions.
pub trait CameraStore: Send {
    /// Returns the stored camera, or `None` if nothing is stored.
    fn load(&self, key: &str) -> Result<Option<Camera>>;

    /// Stores the camera under `key`.
    fn save(&mut self, key: &str, camera: &Camera) -> Result<()>;
}

/// Opens the store configured in `config`.
pub fn open_camera_store(config: &StorageConfig) -> Box<dyn CameraStore> {
    match &config.camera_store_path {
        Some(path) => Box::new(JsonFileCameraStore::new(path)),
        None => Box::new(MemoryCameraStore::new()),
    }
}

fn decode(key: &str, raw: &str) -> Result<Camera> {
    serde_json::from_str(raw).map_err(|e| {
        CollaboratorError::storage(format!("malformed camera under '{}': {}", key, e)).into()
    })
}

fn encode(camera: &Camera) -> Result<String> {
    serde_json::to_string(camera).map_err(|e| CollaboratorError::storage(e.to_string()).into())
}

/// In-process store, lost when dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryCameraStore {
    entries: HashMap<String, String>,
}

impl MemoryCameraStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a raw value, bypassing encoding.
    pub fn insert_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }
}

impl CameraStore for MemoryCameraStore {
    fn load(&self, key: &str) -> Result<Option<Camera>> {
        self.entries.get(key).map(|raw| decode(key, raw)).transpose()
    }

    fn save(&mut self, key: &str, camera: &Camera) -> Result<()> {
        self.entries.insert(key.to_string(), encode(camera)?);
        Ok(())
    }
}

/// Store backed by a JSON object file.
#[derive(Debug, Clone)]
pub struct JsonFileCameraStore {
    path: PathBuf,
}

impl JsonFileCameraStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            CollaboratorError::storage(format!("{}: {}", self.path.display(), e)).into()
        })
    }
}

impl CameraStore for JsonFileCameraStore {
    fn load(&self, key: &str) -> Result<Option<Camera>> {
        let entries = self.read_entries()?;
        match entries.get(key) {
            Some(Value::String(raw)) => decode(key, raw).map(Some),
            Some(_) => Err(CollaboratorError::storage(format!("value under '{}' is not a string", key)).into()),
            None => Ok(None),
        }
    }

    fn save(&mut self, key: &str, camera: &Camera) -> Result<()> {
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), Value::String(encode(camera)?));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| CollaboratorError::storage(e.to_string()))?;
        std::fs::write(&self.path, json)?;

        debug!(path = %self.path.display(), key, "Camera saved");
        Ok(())
    }
}
