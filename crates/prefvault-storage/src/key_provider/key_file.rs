use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, Span};
use zeroize::Zeroizing;

use super::{decode_key, encode_key, generate_key, KeyError, SecureKeyProvider, SymmetricKey};

/// Key stored as base64 in an owner-only file, for platforms without a usable
/// OS keyring.
///
/// The file is published with a no-clobber rename, so separate processes racing
/// on first use still converge on whichever key landed first.
pub struct KeyFileProvider {
    path: PathBuf,
    alias: String,
    cached: OnceCell<SymmetricKey>,
}

impl KeyFileProvider {
    pub fn new(path: impl Into<PathBuf>, alias: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alias: alias.into(),
            cached: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SecureKeyProvider for KeyFileProvider {
    #[instrument(skip_all, fields(path = %self.path.display(), alias = %self.alias))]
    async fn load_or_create_key(&self) -> Result<SymmetricKey, KeyError> {
        self.cached
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let alias = self.alias.clone();
                let span = Span::current();
                tokio::task::spawn_blocking(move || span.in_scope(|| load_or_create(&path, &alias)))
                    .await
                    .map_err(|e| KeyError::Io(format!("blocking task failed: {e}")))?
            })
            .await
            .cloned()
    }
}

fn load_or_create(path: &Path, alias: &str) -> Result<SymmetricKey, KeyError> {
    if let Some(existing) = read_key_file(path, alias)? {
        debug!("loaded existing key file");
        return Ok(existing);
    }

    let parent = path
        .parent()
        .ok_or_else(|| KeyError::Io("invalid key file path".to_string()))?;
    fs::create_dir_all(parent).map_err(io_err)?;

    let key = generate_key(alias)?;

    // NamedTempFile is created with 0600 permissions on unix.
    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(encode_key(&key).as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    match tmp.persist_noclobber(path) {
        Ok(_) => {
            info!("created new key file");
            Ok(key)
        }
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            debug!("key file created concurrently; adopting it");
            read_key_file(path, alias)?
                .ok_or_else(|| KeyError::Io("key file disappeared after creation".to_string()))
        }
        Err(err) => Err(io_err(err.error)),
    }
}

fn read_key_file(path: &Path, alias: &str) -> Result<Option<SymmetricKey>, KeyError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let contents = Zeroizing::new(contents);
            decode_key(alias, &contents).map(Some)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(err)),
    }
}

fn io_err(err: std::io::Error) -> KeyError {
    KeyError::Io(err.to_string())
}
