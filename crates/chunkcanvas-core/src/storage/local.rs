//! Browser `localStorage` view store.

use super::{StorageError, StorageResult, ViewState, ViewStore};

const VIEW_KEY: &str = "chunkcanvas.view";

/// Keeps the view state in `window.localStorage`.
pub struct LocalStorage {
    storage: web_sys::Storage,
}

impl LocalStorage {
    pub fn new() -> StorageResult<Self> {
        let storage = web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?
            .local_storage()
            .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))?
            .ok_or_else(|| StorageError::Unavailable("localStorage disabled".to_string()))?;
        Ok(Self { storage })
    }
}

impl ViewStore for LocalStorage {
    fn load(&self) -> StorageResult<Option<ViewState>> {
        let raw = self
            .storage
            .get_item(VIEW_KEY)
            .map_err(|e| StorageError::Io(format!("{:?}", e)))?;
        raw.map(|json| ViewState::from_json(&json)).transpose()
    }

    fn save(&mut self, state: &ViewState) -> StorageResult<()> {
        let json = state.to_json()?;
        self.storage
            .set_item(VIEW_KEY, &json)
            .map_err(|e| StorageError::Io(format!("{:?}", e)))
    }
}
