pub mod collection;
pub mod config;
pub mod error;
pub mod favorites;
pub mod models;
pub mod search;
pub mod state;
pub mod utils;

pub use collection::{CollectionHost, CollectionReader, CollectionScanner, LocalHost};
pub use error::{FavoritesError, HostError, ScanError, SessionError, WorkerError};
pub use favorites::{FavoritesStore, FsListStorage, ListStorage};
pub use models::{Chunk, Work};
pub use search::SearchWorker;
pub use state::{CollectionEvent, CollectionSession, LoadOutcome, LoadStatus};
