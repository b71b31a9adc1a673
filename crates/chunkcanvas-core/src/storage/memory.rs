//! In-memory view store.

use super::{StorageResult, ViewState, ViewStore};

/// In-memory storage for testing and ephemeral use.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Option<ViewState>,
    saves: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a saved view.
    pub fn with_state(state: ViewState) -> Self {
        Self {
            state: Some(state),
            saves: 0,
        }
    }

    /// How many times `save` was called.
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl ViewStore for MemoryStorage {
    fn load(&self) -> StorageResult<Option<ViewState>> {
        Ok(self.state)
    }

    fn save(&mut self, state: &ViewState) -> StorageResult<()> {
        self.state = Some(*state);
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let mut store = MemoryStorage::new();
        assert_eq!(store.load().unwrap(), None);
        let state = ViewState { offset_x: 4.0, offset_y: 5.0, scale: 6.0 };
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
        assert_eq!(store.save_count(), 1);
    }
}
