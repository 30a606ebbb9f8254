//! Collection reader - pull-based chunk stream over a scan host / 集合读取器
//!
//! States: start -> polling -> finished.
//! - start: one `start_scan` call, emits the initial warnings as an empty chunk
//! - polling: waits `poll_interval`, then polls; a failed poll is an empty,
//!   non-final chunk so the consumer just keeps pulling
//! - finished: after a chunk marked finished
//! - superseded: a newer scan took over, the sequence just ends
//!
//! The consumer can stop pulling at any time; nothing has to be cancelled.

use futures::stream::{self, Stream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::host::CollectionHost;
use crate::error::{HostError, ScanError};
use crate::models::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Start,
    Polling(u64),
    Finished,
    Superseded,
}

/// Collection reader / 集合读取器
pub struct CollectionReader<H: CollectionHost + ?Sized> {
    host: Arc<H>,
    collection: PathBuf,
    poll_interval: Duration,
    state: ReaderState,
}

impl<H: CollectionHost + ?Sized> CollectionReader<H> {
    pub fn new(host: Arc<H>, collection: impl AsRef<Path>, poll_interval: Duration) -> Self {
        Self {
            host,
            collection: collection.as_ref().to_path_buf(),
            poll_interval,
            state: ReaderState::Start,
        }
    }

    /// Scan id once the scan has started / 扫描ID
    pub fn scan_id(&self) -> Option<u64> {
        match self.state {
            ReaderState::Polling(scan_id) => Some(scan_id),
            _ => None,
        }
    }

    /// Whether the scan ran to completion / 扫描是否完成
    pub fn is_finished(&self) -> bool {
        self.state == ReaderState::Finished
    }

    pub fn is_superseded(&self) -> bool {
        self.state == ReaderState::Superseded
    }

    /// Pull the next chunk / 拉取下一批
    ///
    /// `None` once the sequence is over. A fatal start failure is returned
    /// once as `Some(Err(..))` and then the sequence ends.
    pub async fn next_chunk(&mut self) -> Option<Result<Chunk, ScanError>> {
        match self.state {
            ReaderState::Finished | ReaderState::Superseded => None,
            ReaderState::Start => match self.host.start_scan(&self.collection).await {
                Ok(ticket) => {
                    self.state = ReaderState::Polling(ticket.scan_id);
                    Some(Ok(Chunk {
                        works: Vec::new(),
                        warnings: ticket.warnings,
                        finished: false,
                    }))
                }
                Err(HostError::Superseded(scan_id)) => {
                    tracing::debug!("Scan {} of {:?} superseded before it started", scan_id, self.collection);
                    self.state = ReaderState::Superseded;
                    None
                }
                Err(e) => {
                    tracing::error!("Failed to start scan of {:?}: {}", self.collection, e);
                    self.state = ReaderState::Finished;
                    Some(Err(fatal(e, &self.collection)))
                }
            },
            ReaderState::Polling(scan_id) => {
                tokio::time::sleep(self.poll_interval).await;
                match self.host.poll_next_chunk(scan_id).await {
                    Ok(chunk) => {
                        if chunk.finished {
                            tracing::debug!("Scan {} finished", scan_id);
                            self.state = ReaderState::Finished;
                        }
                        Some(Ok(chunk))
                    }
                    Err(e) if e.is_transient() => {
                        tracing::warn!("Polling scan {} failed, retrying: {}", scan_id, e);
                        Some(Ok(Chunk::empty()))
                    }
                    Err(e) => {
                        tracing::debug!("Stopped reading scan {}: {}", scan_id, e);
                        self.state = ReaderState::Superseded;
                        None
                    }
                }
            }
        }
    }

    /// Turn the reader into a `Stream` of chunks / 转换为 Stream
    pub fn into_stream(self) -> impl Stream<Item = Result<Chunk, ScanError>> {
        stream::unfold(self, |mut reader| async move {
            let chunk = reader.next_chunk().await?;
            Some((chunk, reader))
        })
    }
}

fn fatal(error: HostError, collection: &Path) -> ScanError {
    match error {
        HostError::Scan(e) => e,
        _ => ScanError::CollectionNotFound(collection.to_path_buf()),
    }
}
