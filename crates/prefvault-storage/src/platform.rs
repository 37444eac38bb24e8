use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Alias of the key entry in the platform secure facility.
pub const DEFAULT_KEY_ALIAS: &str = "dev.prefvault.key.aes";
/// Keyring service name the alias is filed under.
pub const DEFAULT_KEYRING_SERVICE: &str = "prefvault";
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Secure facility holding the symmetric key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyBackend {
    /// OS keyring (Keychain, Credential Manager, keyutils).
    Keyring,
    /// Owner-only key file under the data directory.
    KeyFile,
}

impl KeyBackend {
    /// Keyring where the OS keyring persists across reboots, key file elsewhere.
    pub fn platform_default() -> Self {
        if cfg!(any(target_os = "macos", target_os = "ios", target_os = "windows")) {
            KeyBackend::Keyring
        } else {
            KeyBackend::KeyFile
        }
    }
}

impl Default for KeyBackend {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Explicit handle to the platform resources the stores need.
///
/// Passed to the factories that build raw stores and key providers instead of
/// being looked up from global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformContext {
    data_dir: PathBuf,
    key_alias: String,
    keyring_service: String,
    key_backend: KeyBackend,
}

impl PlatformContext {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            key_alias: DEFAULT_KEY_ALIAS.to_string(),
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            key_backend: KeyBackend::platform_default(),
        }
    }

    pub fn with_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.key_alias = alias.into();
        self
    }

    pub fn with_keyring_service(mut self, service: impl Into<String>) -> Self {
        self.keyring_service = service.into();
        self
    }

    pub fn with_key_backend(mut self, backend: KeyBackend) -> Self {
        self.key_backend = backend;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn key_alias(&self) -> &str {
        &self.key_alias
    }

    pub fn keyring_service(&self) -> &str {
        &self.keyring_service
    }

    pub fn key_backend(&self) -> KeyBackend {
        self.key_backend
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(PREFERENCES_FILE_NAME)
    }

    pub fn key_file_path(&self) -> PathBuf {
        self.data_dir
            .join("keys")
            .join(format!("{}.key", self.key_alias))
    }

    /// Lock file guarding first-use key creation across processes.
    pub fn key_lock_path(&self) -> PathBuf {
        self.data_dir
            .join("keys")
            .join(format!("{}.lock", self.key_alias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_paths_from_data_dir() {
        let context = PlatformContext::new("/data").with_key_alias("alias");
        assert_eq!(
            context.preferences_path(),
            PathBuf::from("/data/preferences.json")
        );
        assert_eq!(context.key_file_path(), PathBuf::from("/data/keys/alias.key"));
        assert_eq!(context.key_lock_path(), PathBuf::from("/data/keys/alias.lock"));
    }

    #[test]
    fn backend_parses_snake_case() {
        let backend: KeyBackend = serde_json::from_str("\"key_file\"").unwrap();
        assert_eq!(backend, KeyBackend::KeyFile);
    }
}
