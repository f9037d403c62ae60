//! The resolution cache ("glob"): identifier → [`ResolutionRecord`].
//!
//! Three back-ends share the [`DataSource`] interface:
//!
//! - [`CsvDataSource`]: four append-only relation files, loaded into memory
//!   at open time and extended at explicit [`flush`](DataSource::flush) points.
//! - [`RedisDataSource`]: JSON values on a key-value server.
//! - [`MemoryDataSource`]: a plain concurrent map, used for offline data maps
//!   and tests.
//!
//! Every back-end gives `set` union semantics: facts accumulate, validity
//! only moves from unknown to concrete.

pub mod memory;
pub mod network;
pub mod tabular;

use thiserror::Error;

use crate::record::ResolutionRecord;

pub use memory::MemoryDataSource;
pub use network::RedisDataSource;
pub use tabular::CsvDataSource;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("key-value server error: {0}")]
    Backend(#[from] redis::RedisError),
    #[error("cache lock poisoned")]
    Poisoned,
}

/// Storage for resolution records keyed by prefixed identifier.
pub trait DataSource: Send + Sync {
    /// The empty record convention: not valid, no facts.
    fn new_record(&self) -> ResolutionRecord {
        ResolutionRecord::empty()
    }

    /// The stored record, or `None` if the identifier was never seen.
    fn get(&self, id: &str) -> Result<Option<ResolutionRecord>, CacheError>;

    /// Records for `ids`, in the same order.
    fn mget(&self, ids: &[String]) -> Result<Vec<Option<ResolutionRecord>>, CacheError> {
        ids.iter().map(|id| self.get(id)).collect()
    }

    /// Merge `record` into whatever is stored for `id`.
    fn set(&self, id: &str, record: ResolutionRecord) -> Result<(), CacheError>;

    fn mset(&self, records: Vec<(String, ResolutionRecord)>) -> Result<(), CacheError> {
        for (id, record) in records {
            self.set(&id, record)?;
        }
        Ok(())
    }

    /// Persist everything written since the last checkpoint.
    fn flush(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
