use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use prefvault_storage::{
    open_encrypted_store, platform::PlatformContext, PlatformEncryptedStore,
};
#[cfg(test)]
use prefvault_storage::{
    aes_cbc_cipher::AesCbcCipher, encrypted_store::EncryptedKeyValueStore,
    file_store::FilePreferencesStore, key_provider::InMemoryKeyProvider,
};
use tracing::debug;

/// Resolve the default data directory for prefvault.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("prefvault"))
}

/// Platform context with config overrides applied.
pub fn platform_context(config: &Config) -> Result<PlatformContext> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };

    let mut context = PlatformContext::new(root);
    if let Some(key) = &config.key {
        if let Some(backend) = key.backend {
            context = context.with_key_backend(backend);
        }
        if let Some(alias) = &key.alias {
            context = context.with_key_alias(alias.clone());
        }
        if let Some(service) = &key.service {
            context = context.with_keyring_service(service.clone());
        }
    }
    Ok(context)
}

/// Build the encrypted store using config overrides.
pub fn store_from_config(config: &Config) -> Result<PlatformEncryptedStore> {
    let context = platform_context(config)?;
    debug!(root = ?context.data_dir(), "initializing encrypted store");
    Ok(open_encrypted_store(&context))
}

/// Helper for tests to construct a store rooted at a temp dir with an in-memory key.
#[cfg(test)]
pub fn test_store(
    root: impl Into<PathBuf>,
) -> EncryptedKeyValueStore<FilePreferencesStore, AesCbcCipher<InMemoryKeyProvider>> {
    let context = PlatformContext::new(root);
    EncryptedKeyValueStore::new(
        FilePreferencesStore::new(context.preferences_path()),
        AesCbcCipher::new(InMemoryKeyProvider::default()),
    )
}
