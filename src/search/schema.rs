//! Search schema - searchable fields and worker messages / 搜索 Schema 定义
//!
//! Wire shape of the worker protocol:
//! - request: `{"id": 1, "type": "index" | "search", "payload": ...}`
//! - response: `{"id": 1, "payload": ..., "error": null}`

use serde::{Deserialize, Serialize};

use crate::models::Work;

/// Searchable field of a work / 可搜索字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Title,
    CreatorName,
    Tags,
    Description,
}

impl SearchField {
    pub const ALL: [SearchField; 4] = [Self::Title, Self::CreatorName, Self::Tags, Self::Description];

    /// Position in per-field tables / 字段序号
    pub fn index(self) -> usize {
        self as usize
    }

    /// Text of this field for a work / 取出字段文本
    pub fn text(self, work: &Work) -> String {
        match self {
            Self::Title => work.title.clone(),
            Self::CreatorName => work.creator_name.clone(),
            Self::Tags => work.tags.as_ref().map(|tags| tags.join(" ")).unwrap_or_default(),
            Self::Description => work.description.clone().unwrap_or_default(),
        }
    }
}

/// Command carried by a request / 请求命令
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum WorkerCommand {
    /// Add a batch of works to the index / 索引一批作品
    Index(Vec<Work>),
    /// Run a query / 搜索
    Search(String),
}

/// Request sent to the search worker / 发往搜索线程的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Caller-assigned correlation id / 关联ID
    pub id: u64,
    #[serde(flatten)]
    pub command: WorkerCommand,
}

/// Successful answer / 响应内容
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum WorkerPayload {
    /// Number of works accepted by an `index` request / 接收的作品数
    Indexed(usize),
    /// Ranked works of a `search` request / 排序后的结果
    Works(Vec<Work>),
}

/// Response from the search worker / 搜索线程的响应
///
/// `payload` is `None` for a search issued before the index is ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: u64,
    pub payload: Option<WorkerPayload>,
    pub error: Option<String>,
}

impl WorkerResponse {
    pub fn success(id: u64, payload: Option<WorkerPayload>) -> Self {
        Self { id, payload, error: None }
    }

    pub fn failure(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            payload: None,
            error: Some(error.into()),
        }
    }
}
