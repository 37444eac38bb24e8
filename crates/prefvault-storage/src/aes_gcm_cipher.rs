//! Opt-in authenticated cipher. Record layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//!
//! Not wire compatible with AES-CBC records; a store must use one cipher for its
//! whole lifetime.

use aes_gcm::{
    aead::{self, Aead, KeyInit},
    Aes128Gcm, Aes256Gcm,
};
use async_trait::async_trait;
use prefvault_core::cipher::{Cipher, CipherError};
use rand::{rngs::OsRng, RngCore};
use tracing::instrument;

use crate::key_provider::SecureKeyProvider;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// AES-GCM [`Cipher`]; any modification of a record fails decryption.
pub struct AesGcmCipher<P: SecureKeyProvider> {
    key_provider: P,
}

impl<P: SecureKeyProvider> AesGcmCipher<P> {
    pub fn new(key_provider: P) -> Self {
        Self { key_provider }
    }
}

#[async_trait]
impl<P: SecureKeyProvider> Cipher for AesGcmCipher<P> {
    #[instrument(skip_all, fields(len = plaintext.len()))]
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = self.key_provider.load_or_create_key().await?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| CipherError::RandomGeneration {
                reason: e.to_string(),
            })?;

        let sealed = match key.expose().len() {
            16 => seal::<Aes128Gcm>(key.expose(), &nonce, plaintext)?,
            32 => seal::<Aes256Gcm>(key.expose(), &nonce, plaintext)?,
            n => return Err(unsupported_key_len(n)),
        };

        let mut record = Vec::with_capacity(NONCE_LEN + sealed.len());
        record.extend_from_slice(&nonce);
        record.extend_from_slice(&sealed);
        Ok(record)
    }

    #[instrument(skip_all, fields(len = record.len()))]
    async fn decrypt(&self, record: &[u8]) -> Result<Vec<u8>, CipherError> {
        if record.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::decryption(format!(
                "record of {} bytes is shorter than nonce and tag",
                record.len()
            )));
        }

        let key = self.key_provider.load_or_create_key().await?;
        let (nonce, sealed) = record.split_at(NONCE_LEN);
        match key.expose().len() {
            16 => open::<Aes128Gcm>(key.expose(), nonce, sealed),
            32 => open::<Aes256Gcm>(key.expose(), nonce, sealed),
            n => Err(unsupported_key_len(n)),
        }
    }
}

fn seal<C: KeyInit + Aead>(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = C::new_from_slice(key).map_err(|e| CipherError::Encryption {
        reason: format!("cipher init failed: {e}"),
    })?;
    cipher
        .encrypt(aead::Nonce::<C>::from_slice(nonce), plaintext)
        .map_err(|e| CipherError::Encryption {
            reason: e.to_string(),
        })
}

fn open<C: KeyInit + Aead>(key: &[u8], nonce: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = C::new_from_slice(key)
        .map_err(|e| CipherError::decryption(format!("cipher init failed: {e}")))?;
    cipher
        .decrypt(aead::Nonce::<C>::from_slice(nonce), sealed)
        .map_err(|_| CipherError::decryption("authentication failed"))
}

fn unsupported_key_len(len: usize) -> CipherError {
    CipherError::Configuration {
        reason: format!("unsupported AES-GCM key length: {len} bytes"),
    }
}
