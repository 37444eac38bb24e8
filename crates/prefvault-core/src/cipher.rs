use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by cipher implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// The key could not be loaded or created. Not retried.
    #[error("key unavailable: {reason}")]
    Configuration { reason: String },
    /// The OS random source failed while drawing an IV, nonce or key.
    #[error("random generation failed: {reason}")]
    RandomGeneration { reason: String },
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },
    /// Record too short, bad block length, bad padding or failed authentication.
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },
}

impl CipherError {
    pub fn decryption(reason: impl Into<String>) -> Self {
        Self::Decryption {
            reason: reason.into(),
        }
    }
}

/// Symmetric encryption over whole byte buffers.
///
/// `decrypt` either yields the complete plaintext or fails; it never returns a
/// partial result.
#[async_trait]
pub trait Cipher: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}
