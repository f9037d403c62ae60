//! Streaming views over citation triple dumps.
//!
//! Triple files are line based: every citation line carries a subject
//! `<https://w3id.org/oc/index/ci/{CITING}-{CITED}>` and, for provenance
//! lines, an object `<https://w3id.org/oc/index/{SOURCE}/>`. Files are read
//! one line at a time, bare or as `.zip` members, so dumps never have to fit
//! in memory. On top of that:
//!
//! - [`convert`]: one `citation,source` table per zipped dump.
//! - [`count`]: distinct citing entities per cited entity.
//! - [`global`]: the global citation index, pushed into a list store.
//! - [`edit`]: rewrite triples for the unified index or a single service.

pub mod convert;
pub mod count;
pub mod edit;
pub mod global;
pub mod source;
pub mod triple;

use thiserror::Error;

pub use convert::rdf2csv;
pub use count::{InputType, citation_count, count_citations};
pub use edit::{EditMode, EditReport, edit_dir};
pub use global::{
    BATCH_SIZE, BatchPusher, GlobalIndex, ListStore, MemoryListStore, PushReport, RedisListStore,
    push_global_index,
};
pub use triple::{CitationLine, parse_line};

#[derive(Error, Debug)]
pub enum RdfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("list store error: {0}")]
    Store(String),
}

impl From<redis::RedisError> for RdfError {
    fn from(e: redis::RedisError) -> Self {
        RdfError::Store(e.to_string())
    }
}

/// Progress events emitted while streaming a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdfProgress {
    /// Input files found.
    Discovered { files: usize },
    /// One input file (or archive) fully read.
    FileDone {
        file: String,
        lines: usize,
        skipped: usize,
    },
    /// A batch of list-store operations was written.
    Flushed { operations: usize },
    Finished { files: usize, records: usize },
}
