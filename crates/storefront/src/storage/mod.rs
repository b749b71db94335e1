//! Persistent client-side key-value storage.
//!
//! Each store serializes its state as JSON under its own namespace
//! ([`keys`]). Namespaces are independent: a corrupt compare list never
//! prevents the auth session from loading.
//!
//! # Backends
//!
//! - [`FileStore`] - one `<namespace>.json` file per key in a directory
//! - [`MemoryStore`] - process-local map, used in tests and ephemeral sessions

mod file;
mod memory;

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage namespaces for persisted client state.
pub mod keys {
    /// Authenticated identity and bearer token.
    pub const AUTH: &str = "atelier-auth";

    /// UI preferences (display currency).
    pub const UI: &str = "atelier-ui";

    /// Wishlist product IDs and item details.
    pub const WISHLIST: &str = "atelier-wishlist";

    /// Product compare list.
    pub const COMPARE: &str = "atelier-compare";

    /// ID of the active backend cart.
    pub const CART_ID: &str = "atelier-cart-id";

    /// All namespaces, for inspection tooling.
    pub const ALL: &[&str] = &[AUTH, UI, WISHLIST, COMPARE, CART_ID];
}

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Namespace is not a plain file-name-safe identifier.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// A synchronous string key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// List stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Load and decode a JSON value.
///
/// Missing keys and undecodable values both yield `None`; the latter is
/// logged, since a corrupt namespace must not block startup.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get_raw(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read persisted state");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding undecodable persisted state");
            None
        }
    }
}

/// Encode and store a JSON value.
///
/// # Errors
///
/// Returns an error if serialization or the backend write fails.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set_raw(key, &raw)
}

/// In-memory state mirrored to a storage namespace.
///
/// Reads never touch the backend. Every mutation persists the new state;
/// persistence failures are logged and the in-memory state stays
/// authoritative for the rest of the session.
pub struct Persisted<T> {
    key: &'static str,
    storage: Arc<dyn KeyValueStore>,
    state: RwLock<T>,
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    /// Rehydrate from storage, falling back to `T::default()`.
    pub fn load(storage: Arc<dyn KeyValueStore>, key: &'static str) -> Self {
        Self::load_migrating(storage, key, |_| false)
    }

    /// Rehydrate, then run `migrate`. If it reports a change, the migrated
    /// state is written back immediately.
    pub fn load_migrating(
        storage: Arc<dyn KeyValueStore>,
        key: &'static str,
        migrate: impl FnOnce(&mut T) -> bool,
    ) -> Self {
        let mut state: T = load_json(storage.as_ref(), key).unwrap_or_default();
        let migrated = migrate(&mut state);

        let persisted = Self {
            key,
            storage,
            state: RwLock::new(state),
        };
        if migrated {
            tracing::info!(key, "Migrated persisted state");
            persisted.persist();
        }
        persisted
    }

    /// Storage namespace.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }

    /// Run `f` against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.read(Clone::clone)
    }

    /// Mutate the state and persist it.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        };
        self.persist();
        result
    }

    /// Replace the state wholesale and persist it.
    pub fn replace(&self, value: T) {
        self.update(|state| *state = value);
    }

    /// Reset to `T::default()` and delete the namespace.
    pub fn reset(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = T::default();
        if let Err(e) = self.storage.remove(self.key) {
            tracing::warn!(key = self.key, error = %e, "Failed to clear persisted state");
        }
    }

    /// Write the current state, reporting failure to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    pub fn flush(&self) -> Result<(), StorageError> {
        let state = self.snapshot();
        save_json(self.storage.as_ref(), self.key, &state)
    }

    fn persist(&self) {
        if let Err(e) = self.flush() {
            tracing::warn!(key = self.key, error = %e, "Failed to persist state");
        }
    }
}
