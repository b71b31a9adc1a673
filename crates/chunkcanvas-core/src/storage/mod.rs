//! View-state persistence: the viewport offset and scale survive a restart.

mod memory;

#[cfg(not(target_arch = "wasm32"))]
mod file;

#[cfg(target_arch = "wasm32")]
mod local;

pub use memory::MemoryStorage;

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(target_arch = "wasm32")]
pub use local::LocalStorage;

use crate::camera::Viewport;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// The persisted part of a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
}

impl ViewState {
    pub fn of(viewport: &Viewport) -> Self {
        Self {
            offset_x: viewport.offset.x,
            offset_y: viewport.offset.y,
            scale: viewport.scale,
        }
    }

    /// Restore into `viewport`. Non-finite values are ignored and the scale is
    /// clamped to the viewport's limits.
    pub fn apply(&self, viewport: &mut Viewport) {
        if self.offset_x.is_finite() && self.offset_y.is_finite() {
            viewport.offset = Point::new(self.offset_x, self.offset_y);
        }
        if self.scale.is_finite() && self.scale > 0.0 {
            viewport.scale = self.scale.clamp(viewport.min_scale, viewport.max_scale);
        }
    }

    pub fn to_json(&self) -> StorageResult<String> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> StorageResult<Self> {
        serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// A place to keep the view state between sessions.
///
/// Calls are synchronous: every backend is small and local.
pub trait ViewStore {
    /// The saved view, or `None` if nothing was saved yet.
    fn load(&self) -> StorageResult<Option<ViewState>>;

    fn save(&mut self, state: &ViewState) -> StorageResult<()>;
}

/// Platform-specific default store.
#[cfg(not(target_arch = "wasm32"))]
pub fn create_default_store() -> StorageResult<Box<dyn ViewStore>> {
    Ok(Box::new(FileStorage::default_location()?))
}

/// Platform-specific default store.
#[cfg(target_arch = "wasm32")]
pub fn create_default_store() -> StorageResult<Box<dyn ViewStore>> {
    Ok(Box::new(LocalStorage::new()?))
}
