use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

use super::{CodecError, StorageValue, TypedKey, Value, ValueKind};
use crate::cipher::CipherError;

/// Errors produced by key-value store implementations.
///
/// Absence is never an error: `load` returns `Ok(None)` for a missing entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The entry exists but was written with a different kind.
    #[error("kind mismatch for {name}: expected {expected}, found {found}")]
    KindMismatch {
        name: String,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("unsupported value kind: {kind}")]
    UnsupportedKind { kind: String },
    /// The value could not be encoded, or a stored record could not be decoded.
    #[error("encoding failure for {name}: {source}")]
    Encoding {
        name: String,
        #[source]
        source: CodecError,
    },
    #[error(transparent)]
    Cipher(#[from] CipherError),
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Asynchronous typed key-value storage.
///
/// `save` replaces any previous value in full, `remove` is idempotent, and
/// `contains` is true only between a `save` and the next `remove`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Persist a value under a key, overwriting any existing entry.
    async fn save<T: StorageValue>(&self, key: &TypedKey<T>, value: T) -> Result<(), StoreError>;

    /// Retrieve the value for a key, or `None` if it was never saved or was removed.
    async fn load<T: StorageValue>(&self, key: &TypedKey<T>) -> Result<Option<T>, StoreError>;

    /// Remove a key and its value (idempotent).
    async fn remove<T: StorageValue>(&self, key: &TypedKey<T>) -> Result<(), StoreError>;

    async fn contains<T: StorageValue>(&self, key: &TypedKey<T>) -> Result<bool, StoreError> {
        Ok(self.load(key).await?.is_some())
    }
}

/// In-memory raw store for tests and smoke runs. Values are kept in plain form.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyValueStore {
    inner: Arc<Mutex<HashMap<String, Value>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, StoreError> {
        self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn save<T: StorageValue>(&self, key: &TypedKey<T>, value: T) -> Result<(), StoreError> {
        let mut map = self.entries()?;
        map.insert(key.name().to_string(), value.into_value());
        Ok(())
    }

    async fn load<T: StorageValue>(&self, key: &TypedKey<T>) -> Result<Option<T>, StoreError> {
        let map = self.entries()?;
        match map.get(key.name()) {
            None => Ok(None),
            Some(stored) => {
                let found = stored.kind();
                T::from_value(stored.clone())
                    .map(Some)
                    .ok_or_else(|| StoreError::KindMismatch {
                        name: key.name().to_string(),
                        expected: T::KIND,
                        found,
                    })
            }
        }
    }

    async fn remove<T: StorageValue>(&self, key: &TypedKey<T>) -> Result<(), StoreError> {
        let mut map = self.entries()?;
        map.remove(key.name());
        Ok(())
    }
}
