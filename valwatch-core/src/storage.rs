use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Ids kept by the thread store before the oldest-inserted one is evicted.
pub const THREAD_STORE_CAPACITY: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ArticleData {
    #[serde(default)]
    url: String,
}

/// Remembers the last patch-notes URL that was delivered.
#[derive(Debug, Clone)]
pub struct ArticleStore {
    data: ArticleData,
    path: Option<PathBuf>,
}

/// Remembers recently delivered thread ids, oldest first.
///
/// The value for each id is whatever was known about the thread when it was
/// accepted; only the keys take part in dedup.
#[derive(Debug, Clone)]
pub struct ThreadStore {
    seen: IndexMap<String, serde_json::Value>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl ArticleStore {
    pub fn in_memory() -> Self {
        Self {
            data: ArticleData::default(),
            path: None,
        }
    }

    pub async fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = read_json_or_create::<ArticleData>(&path).await;
        Self {
            data,
            path: Some(path),
        }
    }

    /// `None` until something has been accepted.
    pub fn last_url(&self) -> Option<&str> {
        Some(self.data.url.as_str()).filter(|url| !url.is_empty())
    }

    pub fn accept(&mut self, url: impl Into<String>) {
        self.data.url = url.into();
    }

    pub async fn persist(&self) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => write_json_atomic(path, &self.data).await,
            None => {
                debug!("article store is in-memory only; skipping persist");
                Ok(())
            }
        }
    }
}

impl ThreadStore {
    pub fn in_memory() -> Self {
        Self {
            seen: IndexMap::new(),
            capacity: THREAD_STORE_CAPACITY,
            path: None,
        }
    }

    pub async fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let seen = read_json_or_create::<IndexMap<String, serde_json::Value>>(&path).await;
        let mut store = Self {
            seen,
            capacity: THREAD_STORE_CAPACITY,
            path: Some(path),
        };
        store.evict_overflow();
        store
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    /// Records `id` as delivered and returns the ids evicted to stay within capacity.
    ///
    /// Re-inserting a known id keeps its original position.
    pub fn insert(&mut self, id: impl Into<String>, metadata: serde_json::Value) -> Vec<String> {
        self.seen.insert(id.into(), metadata);
        self.evict_overflow()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.seen.keys().map(String::as_str)
    }

    pub fn metadata(&self, id: &str) -> Option<&serde_json::Value> {
        self.seen.get(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub async fn persist(&self) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => write_json_atomic(path, &self.seen).await,
            None => {
                debug!("thread store is in-memory only; skipping persist");
                Ok(())
            }
        }
    }

    fn evict_overflow(&mut self) -> Vec<String> {
        let excess = self.seen.len().saturating_sub(self.capacity);
        self.seen
            .drain(..excess)
            .map(|(id, _)| id)
            .collect()
    }
}

/// Reads `path`, falling back to `<path>.tmp` and then to the default.
///
/// A missing file is created with the default document so the layout on disk
/// is always present after the first load.
async fn read_json_or_create<T>(path: &Path) -> T
where
    T: DeserializeOwned + Serialize + Default,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<T>(&bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to parse store, trying tmp fallback");
                let tmp = tmp_path(path);
                match tokio::fs::read(&tmp).await {
                    Ok(tmp_bytes) => serde_json::from_slice::<T>(&tmp_bytes).unwrap_or_default(),
                    Err(_) => T::default(),
                }
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let value = T::default();
            if let Err(e) = write_json_atomic(path, &value).await {
                warn!(error = %e, "failed to create store file");
            }
            value
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "store unreadable, assuming nothing seen");
            T::default()
        }
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| unavailable(parent, source))?;
        }
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|source| unavailable(&tmp, source))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| unavailable(path, source))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn unavailable(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Unavailable {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_article_store_has_no_last_url() {
        let mut store = ArticleStore::in_memory();
        assert_eq!(store.last_url(), None);
        store.accept("https://playvalorant.com/en-us/news/x");
        assert_eq!(store.last_url(), Some("https://playvalorant.com/en-us/news/x"));
    }

    #[test]
    fn thread_store_evicts_oldest_inserted() {
        let mut store = ThreadStore::in_memory();
        for i in 0..THREAD_STORE_CAPACITY {
            assert!(store.insert(format!("t{i}"), json!({})).is_empty());
        }
        let evicted = store.insert("t10", json!({}));
        assert_eq!(evicted, vec!["t0".to_string()]);
        assert_eq!(store.len(), THREAD_STORE_CAPACITY);
        assert!(!store.contains("t0"));
        assert_eq!(store.ids().next(), Some("t1"));
    }

    #[test]
    fn reinserting_known_id_keeps_position() {
        let mut store = ThreadStore::in_memory();
        store.insert("a", json!({"n": 1}));
        store.insert("b", json!({}));
        store.insert("a", json!({"n": 2}));
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(store.metadata("a"), Some(&json!({"n": 2})));
    }

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/x/posted_threads.json")),
            PathBuf::from("/x/posted_threads.json.tmp")
        );
    }
}
