//! File-based view store for native platforms.

use super::{StorageError, StorageResult, ViewState, ViewStore};
use std::fs;
use std::path::{Path, PathBuf};

const VIEW_FILE: &str = "view.json";

/// Keeps the view state as a JSON file in a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a file store in `base_path`, creating the directory if needed.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// File store in the user's local data directory
    /// (e.g. `~/.local/share/chunkcanvas/`).
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Unavailable("Could not determine home directory".to_string()))?;
        Self::new(base.join("chunkcanvas"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn view_path(&self) -> PathBuf {
        self.base_path.join(VIEW_FILE)
    }
}

impl ViewStore for FileStorage {
    fn load(&self) -> StorageResult<Option<ViewState>> {
        let path = self.view_path();
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        ViewState::from_json(&json).map(Some)
    }

    fn save(&mut self, state: &ViewState) -> StorageResult<()> {
        let path = self.view_path();
        let json = state.to_json()?;
        fs::write(&path, json)
            .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_storage_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStorage::new(dir.path().join("nested")).unwrap();
        assert_eq!(store.load().unwrap(), None);

        let state = ViewState { offset_x: -120.25, offset_y: 64.0, scale: 2.5 };
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));

        let reopened = FileStorage::new(dir.path().join("nested")).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(state));
    }

    #[test]
    fn test_file_storage_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStorage::new(dir.path().to_path_buf()).unwrap();
        fs::write(dir.path().join(VIEW_FILE), "not json").unwrap();
        assert!(matches!(store.load(), Err(StorageError::Serialization(_))));
    }
}
