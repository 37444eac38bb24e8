use std::{
    collections::BTreeMap,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use prefvault_core::storage::{CodecError, KeyValueStore, StorageValue, StoreError, TypedKey, Value};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::instrument;

use crate::lock::{sidecar_lock_path, FileLock};

/// Durable raw store: every entry lives in one JSON snapshot file that is
/// replaced atomically on each update.
///
/// Writers hold an advisory lock on `<file>.lock` for the whole
/// read-modify-write, so separate instances and separate processes sharing the
/// file never lose each other's entries. File work runs on the blocking pool;
/// a cancelled `save` either published the new snapshot or changed nothing.
pub struct FilePreferencesStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FilePreferencesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            lock_path: sidecar_lock_path(&path),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `edit` to the snapshot under the writer lock. The snapshot is only
    /// rewritten when `edit` reports a change.
    async fn update<F>(&self, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Snapshot) -> bool + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        run_blocking(move || {
            let _lock = FileLock::acquire(&lock_path).map_err(storage_err)?;
            let mut snapshot = read_snapshot(&path)?;
            if edit(&mut snapshot) {
                write_snapshot(&path, &snapshot)?;
            }
            Ok(())
        })
        .await
    }
}

type Snapshot = BTreeMap<String, StoredEntry>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
enum StoredEntry {
    Text(String),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl From<Value> for StoredEntry {
    fn from(value: Value) -> Self {
        match value {
            Value::Text(v) => StoredEntry::Text(v),
            Value::Int32(v) => StoredEntry::Int32(v),
            Value::Int64(v) => StoredEntry::Int64(v),
            Value::Float32(v) => StoredEntry::Float32(v),
            Value::Float64(v) => StoredEntry::Float64(v),
            Value::Bool(v) => StoredEntry::Bool(v),
            Value::Bytes(v) => StoredEntry::Bytes(v),
        }
    }
}

impl From<StoredEntry> for Value {
    fn from(entry: StoredEntry) -> Self {
        match entry {
            StoredEntry::Text(v) => Value::Text(v),
            StoredEntry::Int32(v) => Value::Int32(v),
            StoredEntry::Int64(v) => Value::Int64(v),
            StoredEntry::Float32(v) => Value::Float32(v),
            StoredEntry::Float64(v) => Value::Float64(v),
            StoredEntry::Bool(v) => Value::Bool(v),
            StoredEntry::Bytes(v) => Value::Bytes(v),
        }
    }
}

#[async_trait]
impl KeyValueStore for FilePreferencesStore {
    #[instrument(skip_all, fields(key = %key.name()))]
    async fn save<T: StorageValue>(&self, key: &TypedKey<T>, value: T) -> Result<(), StoreError> {
        let value = value.into_value();
        let non_finite = match value {
            Value::Float32(v) => !v.is_finite(),
            Value::Float64(v) => !v.is_finite(),
            _ => false,
        };
        if non_finite {
            return Err(StoreError::Encoding {
                name: key.name().to_string(),
                source: CodecError::NonFinite { kind: value.kind() },
            });
        }

        let name = key.name().to_string();
        let entry = StoredEntry::from(value);
        self.update(move |snapshot| {
            snapshot.insert(name, entry);
            true
        })
        .await
    }

    #[instrument(skip_all, fields(key = %key.name()))]
    async fn load<T: StorageValue>(&self, key: &TypedKey<T>) -> Result<Option<T>, StoreError> {
        let path = self.path.clone();
        let mut snapshot = run_blocking(move || read_snapshot(&path)).await?;
        let Some(entry) = snapshot.remove(key.name()) else {
            return Ok(None);
        };

        let value = Value::from(entry);
        let found = value.kind();
        T::from_value(value)
            .map(Some)
            .ok_or_else(|| StoreError::KindMismatch {
                name: key.name().to_string(),
                expected: T::KIND,
                found,
            })
    }

    #[instrument(skip_all, fields(key = %key.name()))]
    async fn remove<T: StorageValue>(&self, key: &TypedKey<T>) -> Result<(), StoreError> {
        let name = key.name().to_string();
        self.update(move |snapshot| snapshot.remove(&name).is_some())
            .await
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Storage {
            reason: format!("blocking task failed: {e}"),
        })?
}

fn read_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Snapshot::new()),
        Err(err) => return Err(storage_err(err)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Snapshot::new());
    }
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Storage {
        reason: format!("corrupt snapshot {}: {e}", path.display()),
    })
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    let json = serde_json::to_vec(snapshot).map_err(storage_err)?;
    tmp.write_all(&json).map_err(storage_err)?;
    tmp.as_file().sync_all().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::URL_SAFE_NO_PAD;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use prefvault_core::storage::ValueKind;

    use super::*;

    fn temp_store() -> (tempfile::TempDir, FilePreferencesStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilePreferencesStore::new(dir.path().join("prefs").join("preferences.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let (_dir, store) = temp_store();
        store
            .save(&TypedKey::new("name"), "Ada".to_string())
            .await
            .expect("save text");
        store.save(&TypedKey::new("age"), 36i32).await.expect("save i32");
        store.save(&TypedKey::new("epoch"), 1_700_000_000_000i64).await.expect("save i64");
        store.save(&TypedKey::new("ratio"), 0.75f32).await.expect("save f32");
        store.save(&TypedKey::new("pi"), 3.25f64).await.expect("save f64");
        store.save(&TypedKey::new("on"), false).await.expect("save bool");
        store
            .save(&TypedKey::new("blob"), vec![0u8, 1, 254, 255])
            .await
            .expect("save bytes");

        let reopened = FilePreferencesStore::new(store.path());
        assert_eq!(
            reopened.load(&TypedKey::<String>::new("name")).await.unwrap().as_deref(),
            Some("Ada")
        );
        assert_eq!(reopened.load(&TypedKey::<i32>::new("age")).await.unwrap(), Some(36));
        assert_eq!(
            reopened.load(&TypedKey::<i64>::new("epoch")).await.unwrap(),
            Some(1_700_000_000_000)
        );
        assert_eq!(reopened.load(&TypedKey::<f32>::new("ratio")).await.unwrap(), Some(0.75));
        assert_eq!(reopened.load(&TypedKey::<f64>::new("pi")).await.unwrap(), Some(3.25));
        assert_eq!(reopened.load(&TypedKey::<bool>::new("on")).await.unwrap(), Some(false));
        assert_eq!(
            reopened.load(&TypedKey::<Vec<u8>>::new("blob")).await.unwrap(),
            Some(vec![0, 1, 254, 255])
        );
    }

    #[tokio::test]
    async fn snapshot_tags_each_entry_with_its_kind() {
        let (_dir, store) = temp_store();
        store.save(&TypedKey::new("count"), 5i32).await.expect("save");
        store.save(&TypedKey::new("raw"), vec![0xffu8]).await.expect("save");

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path()).expect("read")).expect("json");
        assert_eq!(json["count"]["kind"], "int32");
        assert_eq!(json["count"]["value"], 5);
        assert_eq!(json["raw"]["kind"], "bytes");
        assert_eq!(json["raw"]["value"], "_w");
    }

    #[tokio::test]
    async fn missing_file_means_empty_store() {
        let (_dir, store) = temp_store();
        let key = TypedKey::<String>::new("absent");
        assert_eq!(store.load(&key).await.unwrap(), None);
        assert!(!store.contains(&key).await.unwrap());
        store.remove(&key).await.expect("remove on empty store is a no-op");
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn remove_deletes_only_the_named_entry() {
        let (_dir, store) = temp_store();
        let keep = TypedKey::<bool>::new("keep");
        let drop = TypedKey::<bool>::new("drop");
        store.save(&keep, true).await.expect("save keep");
        store.save(&drop, true).await.expect("save drop");

        store.remove(&drop).await.expect("remove");
        store.remove(&drop).await.expect("remove again");

        assert!(store.contains(&keep).await.unwrap());
        assert!(!store.contains(&drop).await.unwrap());
    }

    #[tokio::test]
    async fn reports_kind_mismatch() {
        let (_dir, store) = temp_store();
        store.save(&TypedKey::<i64>::new("n"), 1).await.expect("save");

        let err = store.load(&TypedKey::<bool>::new("n")).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::KindMismatch {
                name: "n".into(),
                expected: ValueKind::Bool,
                found: ValueKind::Int64,
            }
        );
    }

    #[tokio::test]
    async fn rejects_non_finite_floats() {
        let (_dir, store) = temp_store();
        let err = store
            .save(&TypedKey::<f64>::new("nan"), f64::NAN)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Encoding { .. }));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_storage_error() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"{ not json").unwrap();

        let err = store.load(&TypedKey::<i32>::new("x")).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_to_different_names_do_not_interfere() {
        let (_dir, store) = temp_store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..32i32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.save(&TypedKey::new(format!("entry-{i}")), i).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("save");
        }

        for i in 0..32i32 {
            let key = TypedKey::<i32>::new(format!("entry-{i}"));
            assert_eq!(store.load(&key).await.unwrap(), Some(i));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_instances_on_one_file_keep_every_write() {
        let (_dir, store) = temp_store();
        let path = store.path().to_path_buf();

        let mut handles = Vec::new();
        for i in 0..64i32 {
            // A fresh instance per writer, as separate processes would have.
            let writer = FilePreferencesStore::new(&path);
            handles.push(tokio::spawn(async move {
                writer.save(&TypedKey::new(format!("entry-{i}")), i).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("save");
        }

        let reader = FilePreferencesStore::new(&path);
        let mut lost = Vec::new();
        for i in 0..64i32 {
            let key = TypedKey::<i32>::new(format!("entry-{i}"));
            if reader.load(&key).await.unwrap() != Some(i) {
                lost.push(i);
            }
        }
        assert!(lost.is_empty(), "lost writes: {lost:?}");
    }

    #[tokio::test]
    async fn lock_file_sits_next_to_the_snapshot() {
        let (_dir, store) = temp_store();
        store.save(&TypedKey::new("k"), true).await.expect("save");
        assert!(store.path().with_file_name("preferences.json.lock").exists());
    }

    #[tokio::test]
    async fn waiting_for_the_writer_lock_leaves_the_runtime_free() {
        let (_dir, store) = temp_store();
        let store = Arc::new(store);
        let held = FileLock::acquire(&sidecar_lock_path(store.path())).expect("lock");

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.save(&TypedKey::new("k"), 1i32).await })
        };
        // Single-threaded runtime: a save blocking this thread on the lock would hang here.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!writer.is_finished());

        drop(held);
        writer.await.expect("join").expect("save");
        assert_eq!(store.load(&TypedKey::<i32>::new("k")).await.unwrap(), Some(1));
    }
}
