//! Typed key-value storage contract shared by raw and encrypting stores.

mod key;
mod key_value_store;
mod value;

pub use key::TypedKey;
pub use key_value_store::{InMemoryKeyValueStore, KeyValueStore, StoreError};
pub use value::{CodecError, StorageValue, Value, ValueKind};
