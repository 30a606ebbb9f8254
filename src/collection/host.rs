//! Scan host - runs scans away from the consumer / 扫描宿主
//!
//! The consumer talks to the host through two calls only:
//! - `start_scan`: begin scanning a collection, returns the scan id and the
//!   initial warnings (root-level failure is an error here)
//! - `poll_next_chunk`: take whatever was discovered since the last poll
//!
//! Starting a scan supersedes the previous one. The previous scan task is
//! aborted and polling it reports `HostError::Superseded`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use super::scanner::{CollectionScanner, ScanItem};
use crate::error::HostError;
use crate::models::Chunk;

/// Answer to `start_scan` / 开始扫描的返回值
#[derive(Debug, Clone)]
pub struct ScanTicket {
    pub scan_id: u64,
    pub warnings: Vec<String>,
}

/// Host process primitives used by the collection reader / 集合读取器使用的宿主接口
#[async_trait]
pub trait CollectionHost: Send + Sync {
    async fn start_scan(&self, collection: &Path) -> Result<ScanTicket, HostError>;

    async fn poll_next_chunk(&self, scan_id: u64) -> Result<Chunk, HostError>;
}

/// Running scan / 正在运行的扫描
struct ActiveScan {
    id: u64,
    items: mpsc::UnboundedReceiver<ScanItem>,
    task: JoinHandle<()>,
}

impl Drop for ActiveScan {
    fn drop(&mut self) {
        // 放弃旧扫描
        self.task.abort();
    }
}

/// In-process host backed by tokio tasks / 基于 tokio 任务的本地宿主
pub struct LocalHost {
    scanner: CollectionScanner,
    max_chunk_works: usize,
    next_scan_id: AtomicU64,
    active: Mutex<Option<ActiveScan>>,
}

impl LocalHost {
    pub fn new(scanner: CollectionScanner, max_chunk_works: usize) -> Self {
        Self {
            scanner,
            max_chunk_works: max_chunk_works.max(1),
            next_scan_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    /// Id of the scan currently owned by the host / 当前扫描ID
    pub fn active_scan_id(&self) -> Option<u64> {
        self.active.lock().as_ref().map(|scan| scan.id)
    }
}

#[async_trait]
impl CollectionHost for LocalHost {
    async fn start_scan(&self, collection: &Path) -> Result<ScanTicket, HostError> {
        let scan_id = self.next_scan_id.fetch_add(1, Ordering::SeqCst);
        // 新扫描开始即取代旧扫描，即使根目录读取失败
        self.active.lock().take();

        let creators = self.scanner.list_creators(collection).await?;
        tracing::info!("Scan {} started for {:?} ({} creators)", scan_id, collection, creators.len());

        let (tx, rx) = mpsc::unbounded_channel();
        let scanner = self.scanner.clone();
        let root = collection.to_path_buf();
        let task = tokio::spawn(async move {
            scanner.scan_creators(root, creators, tx).await;
            tracing::debug!("Scan {} task finished", scan_id);
        });

        let mut active = self.active.lock();
        if self.next_scan_id.load(Ordering::SeqCst) != scan_id + 1 {
            // 期间又开始了更新的扫描
            task.abort();
            return Err(HostError::Superseded(scan_id));
        }
        *active = Some(ActiveScan { id: scan_id, items: rx, task });

        Ok(ScanTicket { scan_id, warnings: Vec::new() })
    }

    async fn poll_next_chunk(&self, scan_id: u64) -> Result<Chunk, HostError> {
        let mut active = self.active.lock();
        let scan = match active.as_mut() {
            Some(scan) if scan.id == scan_id => scan,
            Some(_) => return Err(HostError::Superseded(scan_id)),
            None if scan_id < self.next_scan_id.load(Ordering::SeqCst) => {
                return Err(HostError::Superseded(scan_id))
            }
            None => return Err(HostError::NoActiveScan),
        };

        let mut chunk = Chunk::empty();
        while chunk.works.len() < self.max_chunk_works {
            match scan.items.try_recv() {
                Ok(ScanItem::Work(work)) => chunk.works.push(*work),
                Ok(ScanItem::Warning(warning)) => chunk.warnings.push(warning),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    chunk.finished = true;
                    break;
                }
            }
        }
        Ok(chunk)
    }
}
