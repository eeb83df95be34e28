//! Light/dark theme flag persisted in storage.

use std::sync::Arc;

use tracing::debug;

use crate::storage::{KEY_DARK_MODE, KeyValueStore, StorageError};

/// Theme preference backed by a [`KeyValueStore`].
pub struct Theme {
    store: Arc<dyn KeyValueStore>,
    dark: bool,
}

impl Theme {
    /// Loads the flag. Only the exact string `"true"` means dark.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let dark = store.get(KEY_DARK_MODE).as_deref() == Some("true");
        Self { store, dark }
    }

    pub fn is_dark(&self) -> bool {
        self.dark
    }

    /// Flips the theme and persists it. Returns the new value.
    pub fn toggle(&mut self) -> Result<bool, StorageError> {
        self.dark = !self.dark;
        self.store
            .set(KEY_DARK_MODE, if self.dark { "true" } else { "false" })?;
        debug!(dark = self.dark, "theme toggled");
        Ok(self.dark)
    }
}
