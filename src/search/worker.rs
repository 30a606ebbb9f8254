//! Search worker - isolated thread owning the index / 搜索工作线程
//!
//! The worker thread owns a `SearchState` and handles one request at a time in
//! submission order. The tokenizer dictionary loads on its own thread; until
//! it arrives, index batches are queued and searches answer with no payload.
//!
//! `SearchWorker` is the client side: it assigns correlation ids, sends
//! requests and resolves each pending call when its response comes back.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};

use super::engine::SearchIndex;
use super::schema::{WorkerCommand, WorkerPayload, WorkerRequest, WorkerResponse};
use super::tokenizer::{Tokenize, WorkTokenizer};
use crate::error::{TokenizerError, WorkerError};
use crate::models::Work;

/// Outcome of loading a tokenizer / 分词器加载结果
pub type LoadedTokenizer = Result<Box<dyn Tokenize>, TokenizerError>;

/// Tokenizer readiness / 分词器状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Loading,
    Ready,
    Failed(String),
}

/// Message delivered to the worker thread / 工作线程收到的消息
enum Inbox {
    Request(WorkerRequest),
    TokenizerLoaded(LoadedTokenizer),
}

/// State owned by one worker for its whole lifetime / 工作线程持有的状态
pub struct SearchState {
    tokenizer: Option<Box<dyn Tokenize>>,
    load_error: Option<String>,
    queued: Vec<Vec<Work>>,
    index: SearchIndex,
}

impl SearchState {
    /// State waiting for its tokenizer / 等待分词器的状态
    pub fn loading() -> Self {
        Self {
            tokenizer: None,
            load_error: None,
            queued: Vec::new(),
            index: SearchIndex::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.tokenizer.is_some()
    }

    /// Number of indexed works / 已索引数量
    pub fn indexed(&self) -> usize {
        self.index.len()
    }

    /// Install the loaded tokenizer and index queued batches / 安装分词器并处理排队的批次
    pub fn tokenizer_loaded(&mut self, loaded: LoadedTokenizer) {
        match loaded {
            Ok(tokenizer) => {
                let queued = std::mem::take(&mut self.queued);
                let mut added = 0;
                for batch in queued {
                    added += self.index.index_batch(tokenizer.as_ref(), batch);
                }
                tracing::info!("Search tokenizer ready, indexed {} queued works", added);
                self.tokenizer = Some(tokenizer);
            }
            Err(e) => {
                tracing::error!("Search tokenizer failed to load: {}", e);
                self.queued.clear();
                self.load_error = Some(e.to_string());
            }
        }
    }

    /// Handle one command / 处理一条命令
    pub fn handle(&mut self, command: WorkerCommand) -> Result<Option<WorkerPayload>, String> {
        if let Some(error) = &self.load_error {
            return Err(error.clone());
        }

        match command {
            WorkerCommand::Index(works) => {
                let count = works.len();
                match &self.tokenizer {
                    Some(tokenizer) => {
                        let started = Instant::now();
                        let added = self.index.index_batch(tokenizer.as_ref(), works);
                        tracing::debug!("Indexed {} works in {:?}", added, started.elapsed());
                        Ok(Some(WorkerPayload::Indexed(added)))
                    }
                    None => {
                        self.queued.push(works);
                        tracing::debug!("Queued {} works until the tokenizer is ready", count);
                        Ok(Some(WorkerPayload::Indexed(count)))
                    }
                }
            }
            WorkerCommand::Search(query) => {
                let Some(tokenizer) = &self.tokenizer else {
                    return Ok(None);
                };
                let started = Instant::now();
                let works = self.index.search(tokenizer.as_ref(), &query);
                tracing::debug!("Query {:?} matched {} works in {:?}", query, works.len(), started.elapsed());
                Ok(Some(WorkerPayload::Works(works)))
            }
        }
    }
}

/// Client of a search worker thread / 搜索工作线程客户端
///
/// Dropping the client stops the worker once its queue is drained.
pub struct SearchWorker {
    inbox: mpsc::UnboundedSender<Inbox>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<WorkerResponse>>>>,
    readiness: watch::Receiver<Readiness>,
}

impl SearchWorker {
    /// Start a worker with the IPADIC tokenizer / 启动搜索线程
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn() -> Result<Self, WorkerError> {
        Self::spawn_with(|| WorkTokenizer::new().map(|t| Box::new(t) as Box<dyn Tokenize>))
    }

    /// Start a worker with a custom tokenizer loader / 使用自定义分词器启动
    pub fn spawn_with<F>(load: F) -> Result<Self, WorkerError>
    where
        F: FnOnce() -> LoadedTokenizer + Send + 'static,
    {
        let (inbox, mut requests) = mpsc::unbounded_channel::<Inbox>();
        let (responses_tx, mut responses) = mpsc::unbounded_channel::<WorkerResponse>();
        let (readiness_tx, readiness) = watch::channel(Readiness::Loading);

        std::thread::Builder::new().name("search-worker".to_string()).spawn(move || {
            let mut state = SearchState::loading();
            while let Some(message) = requests.blocking_recv() {
                let request = match message {
                    Inbox::TokenizerLoaded(loaded) => {
                        let readiness = match &loaded {
                            Ok(_) => Readiness::Ready,
                            Err(e) => Readiness::Failed(e.to_string()),
                        };
                        state.tokenizer_loaded(loaded);
                        let _ = readiness_tx.send(readiness);
                        continue;
                    }
                    Inbox::Request(request) => request,
                };

                let id = request.id;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| state.handle(request.command)));
                let response = match outcome {
                    Ok(Ok(payload)) => WorkerResponse::success(id, payload),
                    Ok(Err(error)) => WorkerResponse::failure(id, error),
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        tracing::error!("Search request {} panicked: {}", id, message);
                        WorkerResponse::failure(id, message)
                    }
                };
                if responses_tx.send(response).is_err() {
                    break;
                }
            }
            tracing::debug!("Search worker stopped");
        })?;

        let loader_inbox = inbox.clone();
        std::thread::Builder::new().name("search-tokenizer".to_string()).spawn(move || {
            let started = Instant::now();
            let loaded = load();
            tracing::debug!("Tokenizer loaded in {:?}", started.elapsed());
            let _ = loader_inbox.send(Inbox::TokenizerLoaded(loaded));
        })?;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<WorkerResponse>>>> = Arc::new(Mutex::new(HashMap::new()));
        let dispatch = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(response) = responses.recv().await {
                match dispatch.lock().remove(&response.id) {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => tracing::warn!("Dropping response for unknown request {}", response.id),
                }
            }
            // 工作线程已退出，唤醒所有等待者
            dispatch.lock().clear();
        });

        Ok(Self {
            inbox,
            next_id: AtomicU64::new(1),
            pending,
            readiness,
        })
    }

    /// Current tokenizer readiness / 当前分词器状态
    pub fn readiness(&self) -> Readiness {
        self.readiness.borrow().clone()
    }

    /// Wait until the tokenizer is loaded / 等待分词器加载完成
    pub async fn ready(&self) -> Result<(), WorkerError> {
        let mut readiness = self.readiness.clone();
        loop {
            match &*readiness.borrow_and_update() {
                Readiness::Ready => return Ok(()),
                Readiness::Failed(e) => return Err(WorkerError::Worker(e.clone())),
                Readiness::Loading => {}
            }
            readiness.changed().await.map_err(|_| WorkerError::Closed)?;
        }
    }

    /// Index a batch of works / 索引一批作品
    pub async fn index(&self, works: Vec<Work>) -> Result<usize, WorkerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.request(id, WorkerCommand::Index(works)).await? {
            Some(WorkerPayload::Indexed(count)) => Ok(count),
            _ => Err(WorkerError::UnexpectedPayload(id)),
        }
    }

    /// Search the index / 搜索
    ///
    /// `None` while the index is not ready yet.
    pub async fn search(&self, query: &str) -> Result<Option<Vec<Work>>, WorkerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.request(id, WorkerCommand::Search(query.to_string())).await? {
            Some(WorkerPayload::Works(works)) => Ok(Some(works)),
            None => Ok(None),
            Some(_) => Err(WorkerError::UnexpectedPayload(id)),
        }
    }

    async fn request(&self, id: u64, command: WorkerCommand) -> Result<Option<WorkerPayload>, WorkerError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if self.inbox.send(Inbox::Request(WorkerRequest { id, command })).is_err() {
            self.pending.lock().remove(&id);
            return Err(WorkerError::Closed);
        }

        let response = rx.await.map_err(|_| WorkerError::Closed)?;
        match response.error {
            Some(error) => Err(WorkerError::Worker(error)),
            None => Ok(response.payload),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "search worker panicked".to_string()
    }
}
