//! Per-platform provisioning of the single persistent symmetric key.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use prefvault_core::cipher::CipherError;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::platform::{KeyBackend, PlatformContext};

mod key_file;
mod os_keyring;

pub use key_file::KeyFileProvider;
pub use os_keyring::KeyringProvider;

/// Length of keys this crate generates (AES-256).
pub const GENERATED_KEY_LEN: usize = 32;

/// Opaque handle to the AES key stored under a fixed alias.
///
/// Key bytes are wiped on drop and never appear in `Debug` output.
#[derive(Clone)]
pub struct SymmetricKey {
    alias: String,
    bytes: Zeroizing<Vec<u8>>,
}

impl SymmetricKey {
    /// Wrap existing key bytes. AES accepts 16, 24 or 32 byte keys.
    pub fn from_bytes(alias: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(bytes.into());
        if !matches!(bytes.len(), 16 | 24 | 32) {
            return Err(KeyError::Decode(format!(
                "expected 16, 24 or 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            alias: alias.into(),
            bytes,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.alias == other.alias && self.bytes == other.bytes
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("alias", &self.alias)
            .field("bits", &self.bit_len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("key file error: {0}")]
    Io(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

impl From<KeyError> for CipherError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Generation(reason) => CipherError::RandomGeneration { reason },
            other => CipherError::Configuration {
                reason: other.to_string(),
            },
        }
    }
}

/// Loads the key stored under a fixed alias, creating it on first use.
///
/// Implementations must be idempotent, and concurrent first callers must
/// converge on a single key.
#[async_trait]
pub trait SecureKeyProvider: Send + Sync {
    async fn load_or_create_key(&self) -> Result<SymmetricKey, KeyError>;
}

#[async_trait]
impl<P: SecureKeyProvider + ?Sized> SecureKeyProvider for Arc<P> {
    async fn load_or_create_key(&self) -> Result<SymmetricKey, KeyError> {
        (**self).load_or_create_key().await
    }
}

/// The adapter selected for the running platform.
///
/// Built from an explicit [`PlatformContext`], so callers never branch on the
/// platform themselves.
pub enum PlatformKeyProvider {
    Keyring(KeyringProvider),
    KeyFile(KeyFileProvider),
}

impl PlatformKeyProvider {
    pub fn from_context(context: &PlatformContext) -> Self {
        match context.key_backend() {
            KeyBackend::Keyring => Self::Keyring(
                KeyringProvider::new(context.keyring_service(), context.key_alias())
                    .with_lock_file(context.key_lock_path()),
            ),
            KeyBackend::KeyFile => Self::KeyFile(KeyFileProvider::new(
                context.key_file_path(),
                context.key_alias(),
            )),
        }
    }
}

#[async_trait]
impl SecureKeyProvider for PlatformKeyProvider {
    async fn load_or_create_key(&self) -> Result<SymmetricKey, KeyError> {
        match self {
            Self::Keyring(provider) => provider.load_or_create_key().await,
            Self::KeyFile(provider) => provider.load_or_create_key().await,
        }
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<SymmetricKey>>>,
}

impl InMemoryKeyProvider {
    /// Provider that always hands out `key`.
    pub fn with_key(key: SymmetricKey) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(key))),
        }
    }
}

#[async_trait]
impl SecureKeyProvider for InMemoryKeyProvider {
    async fn load_or_create_key(&self) -> Result<SymmetricKey, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let key = generate_key("in-memory")?;
        *guard = Some(key.clone());
        Ok(key)
    }
}

fn generate_key(alias: &str) -> Result<SymmetricKey, KeyError> {
    let mut bytes = Zeroizing::new(vec![0u8; GENERATED_KEY_LEN]);
    OsRng
        .try_fill_bytes(bytes.as_mut_slice())
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    Ok(SymmetricKey {
        alias: alias.to_string(),
        bytes,
    })
}

fn encode_key(key: &SymmetricKey) -> Zeroizing<String> {
    Zeroizing::new(general_purpose::STANDARD.encode(key.expose()))
}

fn decode_key(alias: &str, secret: &str) -> Result<SymmetricKey, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret.trim())
        .map_err(|e| KeyError::Decode(e.to_string()))?;
    SymmetricKey::from_bytes(alias, bytes)
}
