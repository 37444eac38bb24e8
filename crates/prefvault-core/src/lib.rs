//! Core abstractions for prefvault: typed keys, the key-value store contract,
//! and the cipher contract that encrypting stores build on.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod cipher;
pub mod storage;
