use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::errors::{ReminderError, ReminderResult};

const STORE_DIR_NAME: &str = "prayer-reminder";
const STORE_FILE_NAME: &str = "store.json";

/// Persistent string key-value storage owned by the host app.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> ReminderResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> ReminderResult<()>;
    async fn remove(&self, key: &str) -> ReminderResult<()>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> ReminderResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> ReminderResult<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> ReminderResult<()> {
        (**self).remove(key).await
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> ReminderResult<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> ReminderResult<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> ReminderResult<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// All keys in one pretty-printed JSON object on disk.
///
/// The file is read on first access and rewritten in full after every
/// mutation. A missing file is an empty store; a failed write drops the cache
/// so the next access reloads what is actually on disk.
pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<Option<BTreeMap<String, String>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Store file under the platform data directory.
    pub fn default_path() -> ReminderResult<PathBuf> {
        let mut base = dirs::data_dir().ok_or_else(|| {
            ReminderError::Persistence("failed to resolve app data dir".to_string())
        })?;
        base.push(STORE_DIR_NAME);
        base.push(STORE_FILE_NAME);
        Ok(base)
    }

    async fn load(&self) -> ReminderResult<BTreeMap<String, String>> {
        if !fs::try_exists(&self.path).await? {
            info!("no store file at {}, starting empty", self.path.display());
            return Ok(BTreeMap::new());
        }

        debug!("loading store from {}", self.path.display());
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|err| ReminderError::Persistence(format!("failed to read store: {err}")))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|err| ReminderError::Persistence(format!("invalid store JSON: {err}")))
    }

    async fn persist(&self, values: &BTreeMap<String, String>) -> ReminderResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|err| {
                ReminderError::Persistence(format!("failed to create store directory: {err}"))
            })?;
        }
        let serialized = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, serialized)
            .await
            .map_err(|err| ReminderError::Persistence(format!("failed to write store: {err}")))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> ReminderResult<Option<String>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.load().await?);
        }
        Ok(cache.as_ref().and_then(|values| values.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> ReminderResult<()> {
        let mut cache = self.cache.lock().await;
        let mut values = match cache.take() {
            Some(values) => values,
            None => self.load().await?,
        };
        values.insert(key.to_string(), value.to_string());
        self.persist(&values).await?;
        *cache = Some(values);
        Ok(())
    }

    async fn remove(&self, key: &str) -> ReminderResult<()> {
        let mut cache = self.cache.lock().await;
        let mut values = match cache.take() {
            Some(values) => values,
            None => self.load().await?,
        };
        if values.remove(key).is_some() {
            self.persist(&values).await?;
        }
        *cache = Some(values);
        Ok(())
    }
}
