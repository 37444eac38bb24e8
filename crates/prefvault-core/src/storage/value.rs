use std::{fmt, str::FromStr};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use super::StoreError;

/// Closed set of value kinds a store can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Text,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Bytes,
}

impl ValueKind {
    pub const ALL: [ValueKind; 7] = [
        ValueKind::Text,
        ValueKind::Int32,
        ValueKind::Int64,
        ValueKind::Float32,
        ValueKind::Float64,
        ValueKind::Bool,
        ValueKind::Bytes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Text => "text",
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::Float32 => "float32",
            ValueKind::Float64 => "float64",
            ValueKind::Bool => "bool",
            ValueKind::Bytes => "bytes",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "string" => Ok(ValueKind::Text),
            "int32" | "int" => Ok(ValueKind::Int32),
            "int64" | "long" => Ok(ValueKind::Int64),
            "float32" | "float" => Ok(ValueKind::Float32),
            "float64" | "double" => Ok(ValueKind::Float64),
            "bool" | "boolean" => Ok(ValueKind::Bool),
            "bytes" => Ok(ValueKind::Bytes),
            other => Err(StoreError::UnsupportedKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// A stored value tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

/// Failures of the scalar text encoding used ahead of encryption.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// NaN and infinities have no JSON scalar form.
    #[error("{kind} value is not finite")]
    NonFinite { kind: ValueKind },
    #[error("invalid {kind} encoding: {reason}")]
    Malformed { kind: ValueKind, reason: String },
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Text(_) => ValueKind::Text,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::Float32(_) => ValueKind::Float32,
            Value::Float64(_) => ValueKind::Float64,
            Value::Bool(_) => ValueKind::Bool,
            Value::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// Canonical, locale independent byte form of the value.
    ///
    /// Scalars use their JSON text (`42`, `2.5`, `true`, `"text"`); byte values
    /// pass through unchanged.
    pub fn encode_scalar(&self) -> Result<Vec<u8>, CodecError> {
        let kind = self.kind();
        match self {
            Value::Text(v) => to_json(kind, v),
            Value::Int32(v) => to_json(kind, v),
            Value::Int64(v) => to_json(kind, v),
            Value::Float32(v) if !v.is_finite() => Err(CodecError::NonFinite { kind }),
            Value::Float32(v) => to_json(kind, v),
            Value::Float64(v) if !v.is_finite() => Err(CodecError::NonFinite { kind }),
            Value::Float64(v) => to_json(kind, v),
            Value::Bool(v) => to_json(kind, v),
            Value::Bytes(v) => Ok(v.clone()),
        }
    }

    /// Inverse of [`Value::encode_scalar`] for the given kind.
    pub fn decode_scalar(kind: ValueKind, bytes: &[u8]) -> Result<Value, CodecError> {
        let value = match kind {
            ValueKind::Text => Value::Text(from_json(kind, bytes)?),
            ValueKind::Int32 => Value::Int32(from_json(kind, bytes)?),
            ValueKind::Int64 => Value::Int64(from_json(kind, bytes)?),
            ValueKind::Float32 => {
                let v: f32 = from_json(kind, bytes)?;
                if !v.is_finite() {
                    return Err(CodecError::NonFinite { kind });
                }
                Value::Float32(v)
            }
            ValueKind::Float64 => Value::Float64(from_json(kind, bytes)?),
            ValueKind::Bool => Value::Bool(from_json(kind, bytes)?),
            ValueKind::Bytes => Value::Bytes(bytes.to_vec()),
        };
        Ok(value)
    }
}

fn to_json<T: Serialize>(kind: ValueKind, value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

fn from_json<T: DeserializeOwned>(kind: ValueKind, bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

mod sealed {
    pub trait Sealed {}
}

/// Rust types that map onto exactly one [`ValueKind`].
///
/// Sealed: the set of storable types is closed, so a `TypedKey` for any other
/// type is rejected at compile time.
pub trait StorageValue: sealed::Sealed + Sized + Send + Sync + 'static {
    const KIND: ValueKind;

    fn into_value(self) -> Value;

    /// Returns `None` when `value` is of a different kind.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! storage_value {
    ($ty:ty, $variant:ident) => {
        impl sealed::Sealed for $ty {}

        impl StorageValue for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

storage_value!(String, Text);
storage_value!(i32, Int32);
storage_value!(i64, Int64);
storage_value!(f32, Float32);
storage_value!(f64, Float64);
storage_value!(bool, Bool);
storage_value!(Vec<u8>, Bytes);
