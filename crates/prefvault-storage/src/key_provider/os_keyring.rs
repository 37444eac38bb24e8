use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock, Mutex},
};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{debug, info, instrument, Span};
use zeroize::Zeroizing;

use super::{decode_key, encode_key, generate_key, KeyError, SecureKeyProvider, SymmetricKey};
use crate::lock::FileLock;

/// Creation locks shared by every provider in the process, keyed by service and alias.
static CREATION_LOCKS: LazyLock<Mutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>> =
    LazyLock::new(Default::default);

fn creation_lock(service: &str, alias: &str) -> Arc<AsyncMutex<()>> {
    let mut locks = CREATION_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(
        locks
            .entry((service.to_string(), alias.to_string()))
            .or_default(),
    )
}

/// Synchronous secret storage addressed by service and alias.
pub(crate) trait SecretBackend: Send + Sync {
    fn get(&self, service: &str, alias: &str) -> Result<Option<Zeroizing<String>>, KeyError>;
    fn set(&self, service: &str, alias: &str, secret: &str) -> Result<(), KeyError>;
}

struct OsKeyring;

impl SecretBackend for OsKeyring {
    fn get(&self, service: &str, alias: &str) -> Result<Option<Zeroizing<String>>, KeyError> {
        let entry = keyring::Entry::new(service, alias).map_err(keyring_err)?;
        match entry.get_password() {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(keyring_err(err)),
        }
    }

    fn set(&self, service: &str, alias: &str, secret: &str) -> Result<(), KeyError> {
        keyring::Entry::new(service, alias)
            .and_then(|entry| entry.set_password(secret))
            .map_err(keyring_err)
    }
}

fn keyring_err(err: keyring::Error) -> KeyError {
    KeyError::Keyring(err.to_string())
}

/// OS keyring-backed provider (Keychain on Apple platforms, Credential Manager
/// on Windows, kernel keyutils on Linux). Uses the `keyring` crate to store
/// the key under `service`/`alias`.
///
/// Creation runs under a process-wide lock per service and alias, and under an
/// advisory file lock when one is configured, so first use from several
/// providers or processes settles on one key.
pub struct KeyringProvider {
    service: String,
    alias: String,
    lock_file: Option<PathBuf>,
    backend: Arc<dyn SecretBackend>,
    cached: OnceCell<SymmetricKey>,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            alias: alias.into(),
            lock_file: None,
            backend: Arc::new(OsKeyring),
            cached: OnceCell::new(),
        }
    }

    /// Hold an exclusive lock on `path` while loading or creating the key.
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    pub fn lock_file(&self) -> Option<&Path> {
        self.lock_file.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn with_backend(mut self, backend: Arc<dyn SecretBackend>) -> Self {
        self.backend = backend;
        self
    }
}

#[async_trait]
impl SecureKeyProvider for KeyringProvider {
    #[instrument(skip_all, fields(service = %self.service, alias = %self.alias))]
    async fn load_or_create_key(&self) -> Result<SymmetricKey, KeyError> {
        self.cached
            .get_or_try_init(|| async {
                let guard = creation_lock(&self.service, &self.alias).lock_owned().await;
                let backend = Arc::clone(&self.backend);
                let service = self.service.clone();
                let alias = self.alias.clone();
                let lock_file = self.lock_file.clone();
                let span = Span::current();

                // The blocking task owns the guard and finishes even if this future is dropped.
                tokio::task::spawn_blocking(move || {
                    let _guard = guard;
                    span.in_scope(|| {
                        load_or_create(backend.as_ref(), &service, &alias, lock_file.as_deref())
                    })
                })
                .await
                .map_err(|e| KeyError::Keyring(format!("blocking task failed: {e}")))?
            })
            .await
            .cloned()
    }
}

fn load_or_create(
    backend: &dyn SecretBackend,
    service: &str,
    alias: &str,
    lock_file: Option<&Path>,
) -> Result<SymmetricKey, KeyError> {
    let _file_lock = lock_file
        .map(|path| FileLock::acquire(path))
        .transpose()
        .map_err(|e| KeyError::Io(e.to_string()))?;

    if let Some(secret) = backend.get(service, alias)? {
        debug!("loaded existing key from keyring");
        return decode_key(alias, &secret);
    }

    let key = generate_key(alias)?;
    backend.set(service, alias, &encode_key(&key))?;

    // Adopt whatever the keyring holds now; a writer outside these locks may have won.
    let stored = backend
        .get(service, alias)?
        .ok_or_else(|| KeyError::Keyring("key was not persisted by the keyring".to_string()))?;
    let stored = decode_key(alias, &stored)?;
    if stored == key {
        info!("created new key in keyring");
    } else {
        info!("keyring entry was created concurrently; adopting it");
    }
    Ok(stored)
}
