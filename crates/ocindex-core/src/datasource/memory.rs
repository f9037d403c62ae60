use std::collections::HashMap;

use dashmap::DashMap;

use super::{CacheError, DataSource};
use crate::record::{MergeOutcome, ResolutionRecord};

/// In-process data source backed by a [`DashMap`].
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    records: DashMap<String, ResolutionRecord>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing map, e.g. an OCMeta export loaded up front.
    pub fn from_map(map: HashMap<String, ResolutionRecord>) -> Self {
        Self {
            records: map.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A copy of every stored record.
    pub fn snapshot(&self) -> HashMap<String, ResolutionRecord> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl DataSource for MemoryDataSource {
    fn get(&self, id: &str) -> Result<Option<ResolutionRecord>, CacheError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    fn set(&self, id: &str, record: ResolutionRecord) -> Result<(), CacheError> {
        let mut entry = self.records.entry(id.to_string()).or_default();
        if entry.merge(&record) == MergeOutcome::Conflict {
            tracing::warn!(id, stored = ?entry.valid, incoming = ?record.valid, "ignoring contradicting validity");
        }
        Ok(())
    }
}
