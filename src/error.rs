//! Error types / 错误类型
//!
//! Only fatal and transport-level failures are errors. Per-item problems found
//! during a scan are reported as warning strings instead.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal scan failure / 致命扫描错误
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("collection directory not found: {}", .0.display())]
    CollectionNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scan host failure / 扫描宿主错误
#[derive(Error, Debug)]
pub enum HostError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("no scan is running")]
    NoActiveScan,

    #[error("scan {0} was superseded by a newer scan")]
    Superseded(u64),

    #[error("scan host unavailable: {0}")]
    Unavailable(String),
}

impl HostError {
    /// Whether polling may simply be retried / 是否可以重试
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Superseded(_))
    }
}

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("failed to load morphological dictionary: {0}")]
    Dictionary(String),
}

/// Search worker failure / 搜索工作线程错误
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("search worker is not running")]
    Closed,

    #[error("failed to start search worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("search worker error: {0}")]
    Worker(String),

    #[error("unexpected response payload for request {0}")]
    UnexpectedPayload(u64),
}

#[derive(Error, Debug)]
pub enum FavoritesError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Collection session failure / 集合会话错误
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("no collection is loaded")]
    NotLoaded,
}

/// Convenient result type for scanning / 扫描结果类型
pub type ScanResult<T> = std::result::Result<T, ScanError>;
