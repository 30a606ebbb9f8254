//! Collection scanner - walks creators and works / 集合扫描器
//!
//! Layout: `<root>/<creator dir>/<work dir>/<files>`.
//! A missing root is fatal, everything below it only produces warnings.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use super::assembler::WorkAssembler;
use crate::error::{ScanError, ScanResult};
use crate::models::Work;

/// Item emitted while scanning / 扫描过程中产出的条目
#[derive(Debug)]
pub enum ScanItem {
    Work(Box<Work>),
    Warning(String),
}

/// Scanner options / 扫描选项
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Creators and works processed concurrently / 并发数
    pub concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get().max(1),
        }
    }
}

/// Collection scanner / 集合扫描器
#[derive(Clone, Default)]
pub struct CollectionScanner {
    assembler: WorkAssembler,
    options: ScanOptions,
}

/// Result of a complete scan / 完整扫描结果
#[derive(Debug, Default)]
pub struct ScanReport {
    pub works: Vec<Work>,
    pub warnings: Vec<String>,
}

impl CollectionScanner {
    pub fn new(assembler: WorkAssembler, options: ScanOptions) -> Self {
        Self { assembler, options }
    }

    /// List creator directories of the collection root (fatal on failure) / 列出作者目录
    pub async fn list_creators(&self, root: &Path) -> ScanResult<Vec<String>> {
        list_dirs(root).await.map_err(|e| {
            tracing::warn!("Cannot read collection {:?}: {}", root, e);
            ScanError::CollectionNotFound(root.to_path_buf())
        })
    }

    /// Scan the given creators and send every result to `tx` / 扫描作者目录并发送结果
    ///
    /// Returns once every work is assembled or the receiver is gone.
    pub async fn scan_creators(&self, root: PathBuf, creators: Vec<String>, tx: mpsc::UnboundedSender<ScanItem>) {
        let concurrency = self.options.concurrency.max(1);
        let root = root.as_path();

        stream::iter(creators)
            .for_each_concurrent(concurrency, |creator| {
                let tx = tx.clone();
                async move {
                    let works = match list_dirs(&root.join(&creator)).await {
                        Ok(works) => works,
                        Err(e) => {
                            tracing::warn!("Cannot read works of creator {}: {}", creator, e);
                            let _ = tx.send(ScanItem::Warning(format!(
                                "Cannot read works of creator '{}'",
                                creator
                            )));
                            return;
                        }
                    };
                    tracing::debug!("Creator {} has {} works", creator, works.len());

                    stream::iter(works)
                        .for_each_concurrent(concurrency, |work_dir| {
                            let tx = tx.clone();
                            let creator = creator.as_str();
                            async move {
                                if tx.is_closed() {
                                    return;
                                }
                                let assembled = self.assembler.assemble(root, creator, &work_dir).await;
                                for warning in assembled.warnings {
                                    let _ = tx.send(ScanItem::Warning(warning));
                                }
                                if let Some(work) = assembled.work {
                                    let _ = tx.send(ScanItem::Work(Box::new(work)));
                                }
                            }
                        })
                        .await;
                }
            })
            .await;
    }

    /// Scan the whole collection and collect the results / 扫描整个集合
    pub async fn scan(&self, root: &Path) -> ScanResult<ScanReport> {
        let creators = self.list_creators(root).await?;
        tracing::info!("Scanning {} creators in {:?}", creators.len(), root);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scan = self.scan_creators(root.to_path_buf(), creators, tx);

        let collect = async {
            let mut report = ScanReport::default();
            while let Some(item) = rx.recv().await {
                match item {
                    ScanItem::Work(work) => report.works.push(*work),
                    ScanItem::Warning(warning) => report.warnings.push(warning),
                }
            }
            report
        };

        let ((), report) = tokio::join!(scan, collect);
        tracing::info!(
            "Scan of {:?} finished: {} works, {} warnings",
            root,
            report.works.len(),
            report.warnings.len()
        );
        Ok(report)
    }
}

/// List sub-directory names in natural order / 按自然顺序列出子目录
async fn list_dirs(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let is_dir = match entry.file_type().await {
            Ok(file_type) => file_type.is_dir(),
            Err(_) => false,
        };
        if is_dir {
            dirs.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    dirs.sort_by(|a, b| natord::compare(a, b));
    Ok(dirs)
}
