use base64::{engine::general_purpose::STANDARD, Engine as _};
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use prefvault_core::storage::{KeyValueStore, StorageValue, TypedKey, Value, ValueKind};

/// Runs `$body` with `$ty` aliased to the Rust type stored for `$kind`.
macro_rules! with_kind {
    ($kind:expr, $ty:ident => $body:expr) => {
        match $kind {
            ValueKind::Text => {
                type $ty = String;
                $body
            }
            ValueKind::Int32 => {
                type $ty = i32;
                $body
            }
            ValueKind::Int64 => {
                type $ty = i64;
                $body
            }
            ValueKind::Float32 => {
                type $ty = f32;
                $body
            }
            ValueKind::Float64 => {
                type $ty = f64;
                $body
            }
            ValueKind::Bool => {
                type $ty = bool;
                $body
            }
            ValueKind::Bytes => {
                type $ty = Vec<u8>;
                $body
            }
        }
    };
}

pub async fn set<S: KeyValueStore>(store: &S, name: &str, kind: ValueKind, raw: &str) -> Result<()> {
    let value = parse_value(kind, raw)?;
    with_kind!(kind, T => {
        let typed = T::from_value(value).ok_or_else(|| eyre!("value does not match kind {kind}"))?;
        store.save(&TypedKey::<T>::new(name), typed).await?;
    });
    Ok(())
}

pub async fn get<S: KeyValueStore>(store: &S, name: &str, kind: ValueKind) -> Result<Option<String>> {
    let value: Option<Value> = with_kind!(kind, T => {
        store.load(&TypedKey::<T>::new(name)).await?.map(T::into_value)
    });
    Ok(value.as_ref().map(render_value))
}

pub async fn remove<S: KeyValueStore>(store: &S, name: &str, kind: ValueKind) -> Result<()> {
    with_kind!(kind, T => store.remove(&TypedKey::<T>::new(name)).await?);
    Ok(())
}

pub async fn contains<S: KeyValueStore>(store: &S, name: &str, kind: ValueKind) -> Result<bool> {
    let present = with_kind!(kind, T => store.contains(&TypedKey::<T>::new(name)).await?);
    Ok(present)
}

/// Parse command-line text into a value of `kind`.
pub fn parse_value(kind: ValueKind, raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    let value = match kind {
        ValueKind::Text => Value::Text(raw.to_string()),
        ValueKind::Int32 => Value::Int32(trimmed.parse().wrap_err_with(|| invalid(kind, raw))?),
        ValueKind::Int64 => Value::Int64(trimmed.parse().wrap_err_with(|| invalid(kind, raw))?),
        ValueKind::Float32 => Value::Float32(trimmed.parse().wrap_err_with(|| invalid(kind, raw))?),
        ValueKind::Float64 => Value::Float64(trimmed.parse().wrap_err_with(|| invalid(kind, raw))?),
        ValueKind::Bool => Value::Bool(trimmed.parse().wrap_err_with(|| invalid(kind, raw))?),
        ValueKind::Bytes => Value::Bytes(STANDARD.decode(trimmed).wrap_err_with(|| invalid(kind, raw))?),
    };
    Ok(value)
}

pub fn render_value(value: &Value) -> String {
    match value {
        Value::Text(v) => v.clone(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Float32(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Bytes(v) => STANDARD.encode(v),
    }
}

fn invalid(kind: ValueKind, raw: &str) -> String {
    format!("invalid {kind} value: {raw:?}")
}

#[cfg(test)]
mod tests {
    use prefvault_core::storage::InMemoryKeyValueStore;

    use super::*;

    #[tokio::test]
    async fn set_get_remove_for_each_kind() {
        let store = InMemoryKeyValueStore::new();
        let cases = [
            (ValueKind::Text, " spaced text "),
            (ValueKind::Int32, "-7"),
            (ValueKind::Int64, "9000000000"),
            (ValueKind::Float32, "0.5"),
            (ValueKind::Float64, "2.25"),
            (ValueKind::Bool, "true"),
            (ValueKind::Bytes, "AAEC"),
        ];

        for (kind, raw) in cases {
            let name = format!("key-{kind}");
            set(&store, &name, kind, raw).await.expect("set");
            assert!(contains(&store, &name, kind).await.expect("contains"));
            assert_eq!(get(&store, &name, kind).await.expect("get").as_deref(), Some(raw));

            remove(&store, &name, kind).await.expect("remove");
            assert_eq!(get(&store, &name, kind).await.expect("get"), None);
        }
    }

    #[test]
    fn rejects_unparseable_values() {
        assert!(parse_value(ValueKind::Int32, "twelve").is_err());
        assert!(parse_value(ValueKind::Bool, "yes").is_err());
        assert!(parse_value(ValueKind::Bytes, "%%%").is_err());
    }

    #[test]
    fn bytes_render_as_base64() {
        assert_eq!(render_value(&Value::Bytes(vec![0, 1, 2])), "AAEC");
    }
}
