//! Collection ingestion / 集合导入
//!
//! Call direction: reader -> host -> scanner -> assembler -> metadata parser.
//! - `metadata`: metadata file parser
//! - `assembler`: one work directory to one `Work`
//! - `scanner`: creators -> works walk, per-item warnings
//! - `host`: scan host primitives (`start_scan` / `poll_next_chunk`)
//! - `reader`: cancellable chunk stream for consumers

pub mod assembler;
pub mod host;
pub mod metadata;
pub mod reader;
pub mod scanner;

pub use assembler::{HeaderProbe, ImageProbe, WorkAssembler};
pub use host::{CollectionHost, LocalHost, ScanTicket};
pub use metadata::{parse_metadata, Metadata};
pub use reader::CollectionReader;
pub use scanner::{CollectionScanner, ScanOptions, ScanReport};
