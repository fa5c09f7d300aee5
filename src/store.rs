use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::formats::ArticleRecord;

pub const RECORDS_KEY: &str = "records";
pub const STATUS_KEY: &str = "data";

/// Shared key-value slots that outlive a single workflow run.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
}

pub async fn get_json<T, S>(store: &S, key: &str) -> anyhow::Result<Option<T>>
where
    T: serde::de::DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let Some(bytes) = store.get(key).await? else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&bytes).with_context(|| format!("parse json: {key}"))?;
    Ok(Some(value))
}

pub async fn put_json<T, S>(store: &S, key: &str, value: &T) -> anyhow::Result<()>
where
    T: serde::Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    store.put(key, &data).await
}

pub async fn load_records<S>(store: &S) -> anyhow::Result<Option<Vec<ArticleRecord>>>
where
    S: KeyValueStore + ?Sized,
{
    get_json(store, RECORDS_KEY).await.context("load records")
}

pub async fn save_records<S>(store: &S, records: &[ArticleRecord]) -> anyhow::Result<()>
where
    S: KeyValueStore + ?Sized,
{
    put_json(store, RECORDS_KEY, records)
        .await
        .context("save records")
}

/// One `<key>.json` file per slot under `base_dir`.
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    base_dir: PathBuf,
}

impl LocalFsStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn slot_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            anyhow::bail!("invalid store key: {key:?}");
        }
        Ok(self.base_dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for LocalFsStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.slot_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read: {}", path.display())),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let path = self.slot_path(key)?;
        write_atomic(&path, value).await
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.slots.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.slots
            .lock()
            .await
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
