//! Concrete storage implementations with encryption at rest.
//! Uses AES-CBC with keys sourced from the platform secure facility (OS keyring,
//! key file, or test doubles).

pub mod aes_cbc_cipher;
pub mod aes_gcm_cipher;
pub mod encrypted_store;
pub mod file_store;
pub mod key_provider;
mod lock;
pub mod platform;

use tracing::debug;

use crate::{
    aes_cbc_cipher::AesCbcCipher, encrypted_store::EncryptedKeyValueStore,
    file_store::FilePreferencesStore, key_provider::PlatformKeyProvider, platform::PlatformContext,
};

/// Encrypted store wired with the platform's raw store and key provider.
pub type PlatformEncryptedStore =
    EncryptedKeyValueStore<FilePreferencesStore, AesCbcCipher<PlatformKeyProvider>>;

/// Build the production store for `context`. Nothing touches disk or the key
/// facility until the first operation.
pub fn open_encrypted_store(context: &PlatformContext) -> PlatformEncryptedStore {
    debug!(
        data_dir = %context.data_dir().display(),
        backend = ?context.key_backend(),
        "opening encrypted store"
    );
    EncryptedKeyValueStore::new(
        FilePreferencesStore::new(context.preferences_path()),
        AesCbcCipher::new(PlatformKeyProvider::from_context(context)),
    )
}
