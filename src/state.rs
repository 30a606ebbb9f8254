//! Collection session - consumer side of the pipeline / 集合会话
//!
//! Drives one load at a time: scan chunks from the host, feed them to a fresh
//! search worker, keep the work table and warning log, then load favorites.
//! Progress is published on a broadcast channel instead of callbacks.
//!
//! Loading a new collection supersedes the previous load. The older load
//! notices it at its next chunk and stops without touching session state.

use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::collection::{CollectionHost, CollectionReader, CollectionScanner, LocalHost, WorkAssembler};
use crate::config::AppConfig;
use crate::error::{SessionError, WorkerError};
use crate::favorites::{FavoritesStore, FsListStorage, ListStorage};
use crate::models::{Chunk, Work};
use crate::search::SearchWorker;

type WorkerFactory = Arc<dyn Fn() -> Result<SearchWorker, WorkerError> + Send + Sync>;

/// Load status / 加载状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// Session event / 会话事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionEvent {
    LoadStarted { generation: u64, collection: PathBuf },
    WorksAdded { generation: u64, count: usize, total: usize },
    Warnings { generation: u64, warnings: Vec<String> },
    Loaded { generation: u64, total: usize },
    Failed { generation: u64, message: String },
}

/// How a load ended / 加载结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { works: usize, warnings: usize },
    /// A newer load took over / 被更新的加载取代
    Superseded,
}

/// Session options / 会话选项
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    pub list_name: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            list_name: "favorites".to_string(),
        }
    }
}

/// Everything belonging to one loaded collection / 单次加载的数据
struct LoadedCollection {
    path: PathBuf,
    works: RwLock<Vec<Work>>,
    worker: SearchWorker,
    favorites: RwLock<Option<Arc<FavoritesStore>>>,
}

/// Collection session / 集合会话
pub struct CollectionSession {
    host: Arc<dyn CollectionHost>,
    storage: Arc<dyn ListStorage>,
    options: SessionOptions,
    worker_factory: WorkerFactory,
    generation: AtomicU64,
    scan_start: tokio::sync::Mutex<()>,
    status: RwLock<LoadStatus>,
    current: RwLock<Option<Arc<LoadedCollection>>>,
    warnings: RwLock<Vec<String>>,
    event_sender: broadcast::Sender<CollectionEvent>,
}

impl CollectionSession {
    pub fn new(host: Arc<dyn CollectionHost>, storage: Arc<dyn ListStorage>, options: SessionOptions) -> Self {
        let (event_sender, _) = broadcast::channel(256);
        Self {
            host,
            storage,
            options,
            worker_factory: Arc::new(SearchWorker::spawn),
            generation: AtomicU64::new(0),
            scan_start: tokio::sync::Mutex::new(()),
            status: RwLock::new(LoadStatus::Idle),
            current: RwLock::new(None),
            warnings: RwLock::new(Vec::new()),
            event_sender,
        }
    }

    /// Session with a local scan host and file-backed lists / 使用本地宿主创建会话
    pub fn from_config(config: &AppConfig) -> Self {
        let scanner = CollectionScanner::new(WorkAssembler::default(), config.scan.scan_options());
        let host = LocalHost::new(scanner, config.scan.max_chunk_works);
        let options = SessionOptions {
            poll_interval: config.scan.poll_interval(),
            list_name: config.favorites.list_name.clone(),
        };
        Self::new(Arc::new(host), Arc::new(FsListStorage), options)
    }

    /// Replace how search workers are created / 自定义搜索线程的创建方式
    pub fn with_worker_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<SearchWorker, WorkerError> + Send + Sync + 'static,
    {
        self.worker_factory = Arc::new(factory);
        self
    }

    /// 订阅会话事件
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.event_sender.subscribe()
    }

    /// Session events as a stream / 会话事件流
    pub fn events(&self) -> BroadcastStream<CollectionEvent> {
        BroadcastStream::new(self.subscribe())
    }

    pub fn status(&self) -> LoadStatus {
        self.status.read().clone()
    }

    /// Warnings of the current load / 当前加载的警告
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.read().clone()
    }

    /// Path of the current collection / 当前集合路径
    pub fn collection(&self) -> Option<PathBuf> {
        self.current.read().as_ref().map(|loaded| loaded.path.clone())
    }

    /// Works discovered so far / 已发现的作品
    pub fn works(&self) -> Vec<Work> {
        match self.current.read().as_ref() {
            Some(loaded) => loaded.works.read().clone(),
            None => Vec::new(),
        }
    }

    /// Find a work by relative path / 按相对路径查找作品
    pub fn find_work(&self, relative_path: &str) -> Option<Work> {
        let current = self.current.read();
        let loaded = current.as_ref()?;
        let works = loaded.works.read();
        works.iter().find(|w| w.relative_path == relative_path).cloned()
    }

    /// Favorites of the loaded collection / 收藏夹
    ///
    /// Available once a load has completed.
    pub fn favorites(&self) -> Option<Arc<FavoritesStore>> {
        self.current.read().as_ref()?.favorites.read().clone()
    }

    /// Search the current collection / 搜索当前集合
    ///
    /// `Ok(None)` while the search index is not ready yet.
    pub async fn search(&self, query: &str) -> Result<Option<Vec<Work>>, SessionError> {
        let loaded = self.loaded()?;
        Ok(loaded.worker.search(query).await?)
    }

    /// Wait until the search index accepts queries / 等待搜索就绪
    pub async fn search_ready(&self) -> Result<(), SessionError> {
        let loaded = self.loaded()?;
        Ok(loaded.worker.ready().await?)
    }

    /// Load a collection to completion / 加载集合
    ///
    /// Returns `Superseded` when another load started in the meantime.
    pub async fn load(&self, collection: impl AsRef<Path>) -> Result<LoadOutcome, SessionError> {
        let collection = collection.as_ref().to_path_buf();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let worker = match (self.worker_factory)() {
            Ok(worker) => worker,
            Err(e) => {
                if self.install(generation, None) {
                    self.fail(generation, e.to_string());
                }
                return Err(e.into());
            }
        };
        let loaded = Arc::new(LoadedCollection {
            path: collection.clone(),
            works: RwLock::new(Vec::new()),
            worker,
            favorites: RwLock::new(None),
        });

        // 创建搜索线程期间可能已有更新的加载
        if !self.install(generation, Some(Arc::clone(&loaded))) {
            tracing::debug!("Load {} superseded before it started", generation);
            return Ok(LoadOutcome::Superseded);
        }
        self.broadcast(CollectionEvent::LoadStarted {
            generation,
            collection: collection.clone(),
        });
        tracing::info!("Loading collection {:?} (generation {})", collection, generation);

        let mut reader = CollectionReader::new(Arc::clone(&self.host), &collection, self.options.poll_interval);
        let mut next_chunk = {
            // 扫描按加载顺序开始，旧加载不能取代新加载的扫描
            let _start = self.scan_start.lock().await;
            if !self.is_current(generation) {
                return Ok(LoadOutcome::Superseded);
            }
            reader.next_chunk().await
        };
        while let Some(next) = next_chunk {
            if !self.is_current(generation) {
                tracing::debug!("Load {} superseded", generation);
                return Ok(LoadOutcome::Superseded);
            }
            match next {
                Ok(chunk) => self.apply_chunk(generation, &loaded, chunk).await,
                Err(e) => {
                    self.fail(generation, e.to_string());
                    return Err(e.into());
                }
            }
            next_chunk = reader.next_chunk().await;
        }
        // 读取器在未完成时结束说明扫描已被取代
        if !self.is_current(generation) || !reader.is_finished() {
            return Ok(LoadOutcome::Superseded);
        }

        let works = loaded.works.read().clone();
        match FavoritesStore::load(Arc::clone(&self.storage), &collection, &self.options.list_name, &works).await {
            Ok(store) => *loaded.favorites.write() = Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!("Cannot load list {:?}: {}", self.options.list_name, e);
                self.push_warnings(generation, vec![format!("Cannot read list '{}'", self.options.list_name)]);
            }
        }

        let warnings = self.warnings.read().len();
        {
            let mut status = self.status.write();
            if !self.is_current(generation) {
                return Ok(LoadOutcome::Superseded);
            }
            *status = LoadStatus::Loaded;
        }
        self.broadcast(CollectionEvent::Loaded {
            generation,
            total: works.len(),
        });
        tracing::info!("Loaded {} works ({} warnings) from {:?}", works.len(), warnings, collection);
        Ok(LoadOutcome::Loaded {
            works: works.len(),
            warnings,
        })
    }

    async fn apply_chunk(&self, generation: u64, loaded: &LoadedCollection, chunk: Chunk) {
        if !chunk.warnings.is_empty() {
            for warning in &chunk.warnings {
                tracing::warn!("{}", warning);
            }
            self.push_warnings(generation, chunk.warnings.clone());
            self.broadcast(CollectionEvent::Warnings {
                generation,
                warnings: chunk.warnings,
            });
        }

        if chunk.works.is_empty() {
            return;
        }
        let count = chunk.works.len();
        let total = {
            let mut works = loaded.works.write();
            works.extend(chunk.works.iter().cloned());
            works.len()
        };
        if let Err(e) = loaded.worker.index(chunk.works).await {
            tracing::warn!("Indexing {} works failed: {}", count, e);
            self.push_warnings(generation, vec![format!("Cannot index {} works: {}", count, e)]);
        }
        self.broadcast(CollectionEvent::WorksAdded { generation, count, total });
    }

    fn loaded(&self) -> Result<Arc<LoadedCollection>, SessionError> {
        self.current.read().clone().ok_or(SessionError::NotLoaded)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Make `loaded` the current collection if `generation` is still the newest load
    /// 若仍是最新的加载则安装集合
    fn install(&self, generation: u64, loaded: Option<Arc<LoadedCollection>>) -> bool {
        let mut current = self.current.write();
        if !self.is_current(generation) {
            return false;
        }
        *current = loaded;
        self.warnings.write().clear();
        *self.status.write() = LoadStatus::Loading;
        true
    }

    fn push_warnings(&self, generation: u64, warnings: Vec<String>) {
        let mut log = self.warnings.write();
        if self.is_current(generation) {
            log.extend(warnings);
        }
    }

    fn fail(&self, generation: u64, message: String) {
        {
            let mut status = self.status.write();
            if !self.is_current(generation) {
                return;
            }
            *status = LoadStatus::Failed(message.clone());
        }
        tracing::error!("Loading collection failed: {}", message);
        self.broadcast(CollectionEvent::Failed { generation, message });
    }

    /// 广播事件
    fn broadcast(&self, event: CollectionEvent) {
        let _ = self.event_sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ScanOptions;
    use crate::search::engine::tests::PlainTokenizer;
    use crate::search::Tokenize;
    use futures::StreamExt;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn plain_worker() -> Result<SearchWorker, WorkerError> {
        SearchWorker::spawn_with(|| Ok(Box::new(PlainTokenizer) as Box<dyn Tokenize>))
    }

    fn session() -> CollectionSession {
        let scanner = CollectionScanner::new(WorkAssembler::default(), ScanOptions { concurrency: 2 });
        let host = LocalHost::new(scanner, 2);
        let options = SessionOptions {
            poll_interval: Duration::from_millis(1),
            ..SessionOptions::default()
        };
        CollectionSession::new(Arc::new(host), Arc::new(FsListStorage), options).with_worker_factory(plain_worker)
    }

    fn collection(works: &[(&str, &str, &str)]) -> TempDir {
        let root = TempDir::new().unwrap();
        for (creator, work, meta) in works {
            let dir = root.path().join(creator).join(work);
            std::fs::create_dir_all(&dir).unwrap();
            if !meta.is_empty() {
                std::fs::write(dir.join(format!("{}-meta.txt", work)), meta).unwrap();
            }
        }
        root
    }

    #[tokio::test]
    async fn test_load_and_search() {
        let root = collection(&[
            ("Alice (1)", "Sunset (100)", "Tags\nlandscape\nsky\n\n"),
            ("Alice (1)", "Harbor (101)", "Tags\nsea\n\n"),
            ("Bob (2)", "Portrait (200)", ""),
        ]);
        let session = session();
        assert_eq!(session.status(), LoadStatus::Idle);
        assert!(matches!(session.search("x").await, Err(SessionError::NotLoaded)));

        let outcome = session.load(root.path()).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { works: 3, warnings: 0 });
        assert_eq!(session.status(), LoadStatus::Loaded);
        assert_eq!(session.collection().as_deref(), Some(root.path()));
        assert!(session.find_work("Bob (2)/Portrait (200)").is_some());

        session.search_ready().await.unwrap();
        let found = session.search("landscape").await.unwrap().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Sunset");
        assert!(session.search("volcano").await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let root = collection(&[("Alice", "One", ""), ("Alice", "Two", ""), ("Alice", "Three", "")]);
        let session = session();
        let events = session.events();

        session.load(root.path()).await.unwrap();
        drop(session);

        let events: Vec<CollectionEvent> = events.filter_map(|e| async move { e.ok() }).collect().await;
        assert!(matches!(events.first(), Some(CollectionEvent::LoadStarted { generation: 1, .. })));
        assert!(matches!(events.last(), Some(CollectionEvent::Loaded { total: 3, .. })));
        let added: usize = events
            .iter()
            .map(|e| match e {
                CollectionEvent::WorksAdded { count, .. } => *count,
                _ => 0,
            })
            .sum();
        assert_eq!(added, 3);
    }

    #[tokio::test]
    async fn test_missing_collection_fails() {
        let root = TempDir::new().unwrap();
        let session = session();
        let result = session.load(root.path().join("missing")).await;
        assert!(matches!(result, Err(SessionError::Scan(_))));
        assert!(matches!(session.status(), LoadStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_newer_load_supersedes_older_one() {
        let first = collection(&[("Alice", "One", ""), ("Alice", "Two", "")]);
        let second = collection(&[("Bob", "Three", "")]);
        let session = session();

        let (old, new) = tokio::join!(session.load(first.path()), session.load(second.path()));
        assert_eq!(old.unwrap(), LoadOutcome::Superseded);
        assert_eq!(new.unwrap(), LoadOutcome::Loaded { works: 1, warnings: 0 });

        let paths: Vec<String> = session.works().into_iter().map(|w| w.relative_path).collect();
        assert_eq!(paths, vec!["Bob/Three".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_older_load_does_not_replace_newer_one() {
        let first = collection(&[("Alice", "Old", "")]);
        let second = collection(&[("Bob", "New", "")]);

        // 第一个搜索线程创建得很慢
        let calls = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(session().with_worker_factory({
            let calls = Arc::clone(&calls);
            move || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    std::thread::sleep(Duration::from_millis(200));
                }
                plain_worker()
            }
        }));

        let older = tokio::spawn({
            let session = Arc::clone(&session);
            let path = first.path().to_path_buf();
            async move { session.load(path).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let newer = session.load(second.path()).await.unwrap();
        assert_eq!(newer, LoadOutcome::Loaded { works: 1, warnings: 0 });
        assert_eq!(older.await.unwrap().unwrap(), LoadOutcome::Superseded);

        assert_eq!(session.collection().as_deref(), Some(second.path()));
        assert!(session.find_work("Bob/New").is_some());
        assert!(session.find_work("Alice/Old").is_none());
        assert_eq!(session.status(), LoadStatus::Loaded);
        session.search_ready().await.unwrap();
        assert_eq!(session.search("new").await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_favorites_follow_the_load() {
        let root = collection(&[("Alice", "One", ""), ("Alice", "Two", "")]);
        std::fs::write(root.path().join(".favorites"), "Alice/Two\nAlice/Gone\n").unwrap();

        let session = session();
        assert!(session.favorites().is_none());
        session.load(root.path()).await.unwrap();

        let favorites = session.favorites().unwrap();
        let works = favorites.works().await;
        assert_eq!(works.len(), 1);
        assert_eq!(works[0].relative_path, "Alice/Two");

        let one = session.find_work("Alice/One").unwrap();
        favorites.add(&[one]).await.unwrap();
        let saved = std::fs::read_to_string(root.path().join(".favorites")).unwrap();
        assert_eq!(saved, "Alice/Two\nAlice/One\n");
    }
}
