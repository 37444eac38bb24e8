//! AES-CBC with PKCS#7 padding and a random IV per record.
//!
//! Record layout: `IV (16 bytes) || ciphertext`. There is no version tag and no
//! authentication tag, so tampering is not reliably detected: a flipped IV bit
//! flips the same plaintext bit and still decrypts. Use
//! [`AesGcmCipher`](crate::aes_gcm_cipher::AesGcmCipher) where integrity matters.

use aes::{
    cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit},
    Aes128, Aes192, Aes256,
};
use async_trait::async_trait;
use prefvault_core::cipher::{Cipher, CipherError};
use rand::{rngs::OsRng, RngCore};
use tracing::instrument;

use crate::key_provider::SecureKeyProvider;

pub const BLOCK_SIZE: usize = 16;
pub const IV_LEN: usize = 16;

/// [`Cipher`] drawing its key from a [`SecureKeyProvider`].
pub struct AesCbcCipher<P: SecureKeyProvider> {
    key_provider: P,
}

impl<P: SecureKeyProvider> AesCbcCipher<P> {
    pub fn new(key_provider: P) -> Self {
        Self { key_provider }
    }

    pub fn key_provider(&self) -> &P {
        &self.key_provider
    }
}

#[async_trait]
impl<P: SecureKeyProvider> Cipher for AesCbcCipher<P> {
    #[instrument(skip_all, fields(len = plaintext.len()))]
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = self.key_provider.load_or_create_key().await?;

        let mut iv = [0u8; IV_LEN];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| CipherError::RandomGeneration {
                reason: e.to_string(),
            })?;

        let ciphertext = aes_cbc_encrypt(key.expose(), &iv, plaintext)?;
        let mut record = Vec::with_capacity(IV_LEN + ciphertext.len());
        record.extend_from_slice(&iv);
        record.extend_from_slice(&ciphertext);
        Ok(record)
    }

    #[instrument(skip_all, fields(len = record.len()))]
    async fn decrypt(&self, record: &[u8]) -> Result<Vec<u8>, CipherError> {
        if record.len() < IV_LEN {
            return Err(CipherError::decryption(format!(
                "record of {} bytes is shorter than the {IV_LEN}-byte IV",
                record.len()
            )));
        }

        let key = self.key_provider.load_or_create_key().await?;
        let (iv, ciphertext) = record.split_at(IV_LEN);
        aes_cbc_decrypt(key.expose(), iv, ciphertext)
    }
}

/// Raw AES-CBC/PKCS#7 encryption. The key length selects AES-128/192/256.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let ciphertext = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        n => return Err(unsupported_key_len(n)),
    };
    ciphertext.map_err(|e| CipherError::Encryption {
        reason: format!("cipher init failed: {e}"),
    })
}

/// Raw AES-CBC/PKCS#7 decryption. Fails on a bad block length or bad padding.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::decryption(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    let plaintext = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        n => return Err(unsupported_key_len(n)),
    };
    plaintext
        .map_err(|e| CipherError::decryption(format!("cipher init failed: {e}")))?
        .map_err(|_| CipherError::decryption("invalid padding"))
}

fn unsupported_key_len(len: usize) -> CipherError {
    CipherError::Configuration {
        reason: format!("unsupported AES key length: {len} bytes"),
    }
}
