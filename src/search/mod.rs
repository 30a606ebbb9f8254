//! Search module - only provides search capabilities (primitives), does not control flow / 搜索模块
//!
//! Architecture principles / 架构原则：
//! - The index lives on its own worker thread and is only reached through
//!   `index` and `search` requests
//! - The session decides what to index and when / 由会话控制索引时机
//! - Call direction: session -> worker -> index (unidirectional) / 调用方向
//!
//! Index features / 索引特性：
//! - Session-scoped, additive only, rebuilt on every load
//! - Japanese morphological segmentation with reading normalization
//! - Ranking by number of matched fields

pub mod engine;
pub mod schema;
pub mod tokenizer;
pub mod worker;

pub use engine::SearchIndex;
pub use schema::{SearchField, WorkerCommand, WorkerPayload, WorkerRequest, WorkerResponse};
pub use tokenizer::{Tokenize, WorkTokenizer};
pub use worker::{Readiness, SearchState, SearchWorker};
