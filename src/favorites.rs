//! Favorites store - persisted, ordered set of works / 收藏夹
//!
//! A list is a flat file in the collection root, one relative path per line,
//! rewritten completely on every change. Entries that no longer match a
//! scanned work are dropped when the list is loaded.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::FavoritesError;
use crate::models::Work;

/// Persistence of named lists / 列表持久化接口
#[async_trait]
pub trait ListStorage: Send + Sync {
    /// Raw entries of a list, `None` when it was never written / 读取列表
    async fn read_list(&self, collection: &Path, list_name: &str) -> Result<Option<Vec<String>>, FavoritesError>;

    /// Replace the list with `entries` / 覆盖写入列表
    async fn write_list(&self, collection: &Path, list_name: &str, entries: &[String]) -> Result<(), FavoritesError>;
}

/// Lists stored as hidden files in the collection root / 以隐藏文件保存在集合根目录
#[derive(Debug, Clone, Copy, Default)]
pub struct FsListStorage;

impl FsListStorage {
    pub fn list_path(collection: &Path, list_name: &str) -> PathBuf {
        collection.join(format!(".{}", list_name))
    }
}

#[async_trait]
impl ListStorage for FsListStorage {
    async fn read_list(&self, collection: &Path, list_name: &str) -> Result<Option<Vec<String>>, FavoritesError> {
        let path = Self::list_path(collection, list_name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entries = content
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Some(entries))
    }

    async fn write_list(&self, collection: &Path, list_name: &str, entries: &[String]) -> Result<(), FavoritesError> {
        let path = Self::list_path(collection, list_name);
        let mut content = entries.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        tokio::fs::write(&path, content).await?;
        tracing::debug!("Wrote {} entries to {:?}", entries.len(), path);
        Ok(())
    }
}

/// Load a list and resolve it against the scanned works / 读取列表并匹配作品
///
/// Duplicates collapse to their first occurrence. Unknown entries are dropped.
pub async fn read_favorites(
    storage: &dyn ListStorage,
    collection: &Path,
    list_name: &str,
    all_works: &[Work],
) -> Result<Vec<Work>, FavoritesError> {
    let Some(entries) = storage.read_list(collection, list_name).await? else {
        return Ok(Vec::new());
    };

    let by_path: HashMap<&str, &Work> = all_works.iter().map(|w| (w.relative_path.as_str(), w)).collect();
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    for entry in &entries {
        if !seen.insert(entry.as_str()) {
            continue;
        }
        match by_path.get(entry.as_str()) {
            Some(work) => resolved.push((*work).clone()),
            None => tracing::debug!("Dropping unknown list entry {:?}", entry),
        }
    }
    Ok(resolved)
}

/// Persist the relative paths of `works` / 保存作品列表
pub async fn write_favorites(
    storage: &dyn ListStorage,
    collection: &Path,
    list_name: &str,
    works: &[Work],
) -> Result<(), FavoritesError> {
    let entries: Vec<String> = works.iter().map(|w| w.relative_path.clone()).collect();
    storage.write_list(collection, list_name, &entries).await
}

/// Favorites of one collection / 单个集合的收藏夹
///
/// Every mutation holds the lock across read, modify and persist, so
/// concurrent calls never lose an update.
pub struct FavoritesStore {
    storage: Arc<dyn ListStorage>,
    collection: PathBuf,
    list_name: String,
    works: Mutex<Vec<Work>>,
}

impl FavoritesStore {
    /// Load the list for a scanned collection / 加载收藏夹
    pub async fn load(
        storage: Arc<dyn ListStorage>,
        collection: impl Into<PathBuf>,
        list_name: impl Into<String>,
        all_works: &[Work],
    ) -> Result<Self, FavoritesError> {
        let collection = collection.into();
        let list_name = list_name.into();
        let works = read_favorites(storage.as_ref(), &collection, &list_name, all_works).await?;
        tracing::info!("Loaded {} works from list {:?}", works.len(), list_name);
        Ok(Self {
            storage,
            collection,
            list_name,
            works: Mutex::new(works),
        })
    }

    pub fn list_name(&self) -> &str {
        &self.list_name
    }

    /// Snapshot of the list / 当前列表
    pub async fn works(&self) -> Vec<Work> {
        self.works.lock().await.clone()
    }

    pub async fn contains(&self, work: &Work) -> bool {
        self.works.lock().await.contains(work)
    }

    /// Append works that are not in the list yet / 添加
    pub async fn add(&self, works: &[Work]) -> Result<(), FavoritesError> {
        let mut current = self.works.lock().await;
        let mut next = current.clone();
        for work in works {
            if !next.contains(work) {
                next.push(work.clone());
            }
        }
        self.commit(&mut current, next).await
    }

    /// Remove works by identity / 移除
    pub async fn remove(&self, works: &[Work]) -> Result<(), FavoritesError> {
        let mut current = self.works.lock().await;
        let next = current.iter().filter(|w| !works.contains(w)).cloned().collect();
        self.commit(&mut current, next).await
    }

    pub async fn clear(&self) -> Result<(), FavoritesError> {
        let mut current = self.works.lock().await;
        self.commit(&mut current, Vec::new()).await
    }

    async fn commit(&self, current: &mut Vec<Work>, next: Vec<Work>) -> Result<(), FavoritesError> {
        write_favorites(self.storage.as_ref(), &self.collection, &self.list_name, &next).await?;
        *current = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::work;
    use tempfile::TempDir;

    fn all_works() -> Vec<Work> {
        vec![work("a/1", "One"), work("a/2", "Two"), work("b/1", "Three")]
    }

    #[tokio::test]
    async fn test_missing_list_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(FsListStorage.read_list(dir.path(), "favorites").await.unwrap().is_none());
        let works = read_favorites(&FsListStorage, dir.path(), "favorites", &all_works()).await.unwrap();
        assert!(works.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_dedups_and_drops_unknown() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".favorites"), "b/1\na/1\r\nb/1\ngone/9\n\n").unwrap();

        let works = read_favorites(&FsListStorage, dir.path(), "favorites", &all_works()).await.unwrap();
        let paths: Vec<&str> = works.iter().map(|w| w.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["b/1", "a/1"]);

        write_favorites(&FsListStorage, dir.path(), "favorites", &works).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join(".favorites")).unwrap(), "b/1\na/1\n");
    }

    #[tokio::test]
    async fn test_store_mutations() {
        let dir = TempDir::new().unwrap();
        let all = all_works();
        let store = FavoritesStore::load(Arc::new(FsListStorage), dir.path(), "favorites", &all)
            .await
            .unwrap();

        store.add(&[all[0].clone(), all[2].clone(), all[0].clone()]).await.unwrap();
        assert!(store.contains(&all[0]).await);
        assert!(!store.contains(&all[1]).await);
        assert_eq!(store.works().await.len(), 2);

        store.remove(&[all[0].clone()]).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join(".favorites")).unwrap(), "b/1\n");

        // 重新加载得到相同内容
        let reloaded = FavoritesStore::load(Arc::new(FsListStorage), dir.path(), "favorites", &all)
            .await
            .unwrap();
        assert_eq!(reloaded.works().await, vec![all[2].clone()]);

        reloaded.clear().await.unwrap();
        assert!(reloaded.works().await.is_empty());
        assert_eq!(std::fs::read_to_string(dir.path().join(".favorites")).unwrap(), "");
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let all = all_works();
        let store = Arc::new(
            FavoritesStore::load(Arc::new(FsListStorage), dir.path(), "favorites", &all)
                .await
                .unwrap(),
        );

        let handles: Vec<_> = all
            .iter()
            .cloned()
            .map(|w| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.add(&[w]).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.works().await.len(), 3);
        let saved = std::fs::read_to_string(dir.path().join(".favorites")).unwrap();
        assert_eq!(saved.lines().count(), 3);
    }
}
