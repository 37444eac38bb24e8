use async_trait::async_trait;
use prefvault_core::{
    cipher::Cipher,
    storage::{CodecError, KeyValueStore, StorageValue, StoreError, TypedKey, Value},
};
use tracing::instrument;
use zeroize::Zeroizing;

/// Decorator that encrypts every value before handing it to a raw store.
///
/// Scalars are first rendered to their JSON text; byte values are encrypted
/// as-is. The record is stored as bytes under the caller's key name.
pub struct EncryptedKeyValueStore<S, C> {
    base: S,
    cipher: C,
}

impl<S: KeyValueStore, C: Cipher> EncryptedKeyValueStore<S, C> {
    pub fn new(base: S, cipher: C) -> Self {
        Self { base, cipher }
    }

    /// The raw store holding the encrypted records.
    pub fn base(&self) -> &S {
        &self.base
    }

    pub fn cipher(&self) -> &C {
        &self.cipher
    }
}

#[async_trait]
impl<S: KeyValueStore, C: Cipher> KeyValueStore for EncryptedKeyValueStore<S, C> {
    #[instrument(skip_all, fields(key = %key.name(), kind = %key.kind()))]
    async fn save<T: StorageValue>(&self, key: &TypedKey<T>, value: T) -> Result<(), StoreError> {
        let plaintext = value
            .into_value()
            .encode_scalar()
            .map(Zeroizing::new)
            .map_err(|source| StoreError::Encoding {
                name: key.name().to_string(),
                source,
            })?;

        let record = self.cipher.encrypt(plaintext.as_slice()).await?;
        self.base.save(&key.retyped::<Vec<u8>>(), record).await
    }

    #[instrument(skip_all, fields(key = %key.name(), kind = %key.kind()))]
    async fn load<T: StorageValue>(&self, key: &TypedKey<T>) -> Result<Option<T>, StoreError> {
        let Some(record) = self.base.load(&key.retyped::<Vec<u8>>()).await? else {
            return Ok(None);
        };

        let plaintext = Zeroizing::new(self.cipher.decrypt(&record).await?);
        let value =
            Value::decode_scalar(T::KIND, &plaintext).map_err(|source| StoreError::Encoding {
                name: key.name().to_string(),
                source,
            })?;
        let found = value.kind();
        T::from_value(value)
            .map(Some)
            .ok_or_else(|| StoreError::Encoding {
                name: key.name().to_string(),
                source: CodecError::Malformed {
                    kind: T::KIND,
                    reason: format!("decoded a {found} value"),
                },
            })
    }

    #[instrument(skip_all, fields(key = %key.name()))]
    async fn remove<T: StorageValue>(&self, key: &TypedKey<T>) -> Result<(), StoreError> {
        self.base.remove(&key.retyped::<Vec<u8>>()).await
    }
}
