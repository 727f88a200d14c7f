//! 键值存储：多步交易协议跨进程重启恢复状态
//!
//! 所有操作都可能失败，统一返回 `SdkError::Storage`。

use std::{
    collections::HashMap,
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;

use crate::error::{SdkError, SdkResult};

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> SdkResult<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> SdkResult<()>;

    /// 键不存在时视为成功
    async fn remove(&self, key: &str) -> SdkResult<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 内存实现
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default, Clone)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> SdkResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> SdkResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> SdkResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 文件实现：目录下每个键一个文件
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// 目录不存在时创建
    pub async fn open(root: impl AsRef<Path>) -> SdkResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| storage_error(&format!("create {}", root.display()), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> SdkResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(SdkError::Storage(format!("invalid key {:?}", key)));
        }
        Ok(self.root.join(key))
    }
}

fn storage_error(action: &str, err: std::io::Error) -> SdkError {
    SdkError::Storage(format!("{}: {}", action, err))
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> SdkResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(&format!("read {}", key), e)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> SdkResult<()> {
        let path = self.path(key)?;
        // 先写临时文件再改名，避免中途崩溃留下半截记录
        let tmp = self.root.join(format!(".{}.tmp", key));
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| storage_error(&format!("write {}", key), e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_error(&format!("rename {}", key), e))
    }

    async fn remove(&self, key: &str) -> SdkResult<()> {
        match tokio::fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&format!("remove {}", key), e)),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON 记录
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 以 JSON 存取某一类记录
pub struct TypedStore<T> {
    store: Arc<dyn KeyValueStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> TypedStore<T> {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// 记录损坏时记日志并返回 `None`
    pub async fn load(&self, key: &str) -> SdkResult<Option<T>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::error!(key, error = %e, "stored record is unreadable");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, key: &str, record: &T) -> SdkResult<()> {
        let bytes = serde_json::to_vec(record).map_err(|e| SdkError::Storage(format!("encode {}: {}", key, e)))?;
        self.store.put(key, bytes).await
    }

    pub async fn remove(&self, key: &str) -> SdkResult<()> {
        self.store.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: u32,
        note: String,
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.put("k", b"v".to_vec()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        for key in ["", "../escape", "a/b", ".hidden"] {
            assert!(matches!(store.put(key, vec![1]).await, Err(SdkError::Storage(_))));
        }
    }

    #[tokio::test]
    async fn test_typed_store_corrupt_record() {
        let raw = Arc::new(InMemoryStore::new());
        raw.put("Record-1", b"{not json".to_vec()).await.unwrap();

        let typed: TypedStore<Record> = TypedStore::new(raw.clone());
        assert_eq!(typed.load("Record-1").await.unwrap(), None);

        let record = Record {
            id: 1,
            note: "pending".into(),
        };
        typed.save("Record-1", &record).await.unwrap();
        assert_eq!(typed.load("Record-1").await.unwrap(), Some(record));
        typed.remove("Record-1").await.unwrap();
        assert_eq!(raw.get("Record-1").await.unwrap(), None);
    }
}
