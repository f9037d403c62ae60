//! Tabular resolution cache: four `"id","value"` relation files per service.
//!
//! Each relation is a multimap `id → set<value>`. `valid_id` holds `v` or
//! `i`; the fact relations hold one row per value, and an empty value marks
//! "resolved, nothing found" so it can be told apart from "never seen".
//!
//! Reads are served from memory. Writes update memory immediately and queue
//! new rows; [`flush`](DataSource::flush) appends the queue to disk under a
//! single writer lock, so a crash never leaves a half-written row behind a
//! checkpoint.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;

use super::{CacheError, DataSource};
use crate::record::{ResolutionRecord, Validity};

const VALID: &str = "v";
const INVALID: &str = "i";
/// Marks an identifier whose relation is known to be empty.
const SENTINEL: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    ValidId,
    IdDate,
    IdIssn,
    IdOrcid,
}

impl Relation {
    pub const ALL: [Relation; 4] = [
        Relation::ValidId,
        Relation::IdDate,
        Relation::IdIssn,
        Relation::IdOrcid,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Relation::ValidId => "valid_id.csv",
            Relation::IdDate => "id_date.csv",
            Relation::IdIssn => "id_issn.csv",
            Relation::IdOrcid => "id_orcid.csv",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

type Table = DashMap<String, BTreeSet<String>>;

pub struct CsvDataSource {
    dir: PathBuf,
    tables: [Table; 4],
    /// Rows added since the last flush; the mutex is also the writer lock.
    pending: Mutex<Vec<(Relation, String, String)>>,
}

impl CsvDataSource {
    /// Load (or create) the relation files under `dir`.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir)?;
        let tables: [Table; 4] = Default::default();

        for relation in Relation::ALL {
            let path = dir.join(relation.file_name());
            if !path.exists() {
                continue;
            }
            let table = &tables[relation.index()];
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_path(&path)?;
            let mut rows = 0usize;
            for row in reader.records() {
                let row = row?;
                let Some(id) = row.get(0).filter(|id| !id.is_empty()) else {
                    continue;
                };
                let value = row.get(1).unwrap_or(SENTINEL);
                table.entry(id.to_string()).or_default().insert(value.to_string());
                rows += 1;
            }
            tracing::debug!(path = %path.display(), rows, "loaded relation");
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            tables,
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of identifiers with a recorded validity.
    pub fn len(&self) -> usize {
        self.table(Relation::ValidId).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows waiting for the next flush.
    pub fn pending_rows(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn table(&self, relation: Relation) -> &Table {
        &self.tables[relation.index()]
    }

    fn stored_validity(&self, id: &str) -> Validity {
        match self.table(Relation::ValidId).get(id) {
            Some(values) if values.contains(VALID) => Validity::Valid,
            Some(values) if values.contains(INVALID) => Validity::Invalid,
            _ => Validity::Unknown,
        }
    }

    /// Record the validity decision; returns the validity now in force.
    fn put_validity(&self, id: &str, incoming: Validity, rows: &mut Vec<(Relation, String, String)>) -> Validity {
        let (mark, opposite) = match incoming {
            Validity::Unknown => return self.stored_validity(id),
            Validity::Valid => (VALID, INVALID),
            Validity::Invalid => (INVALID, VALID),
        };
        let mut values = self.table(Relation::ValidId).entry(id.to_string()).or_default();
        if values.contains(opposite) {
            tracing::warn!(id, incoming = ?incoming, "ignoring contradicting validity");
            return if opposite == VALID { Validity::Valid } else { Validity::Invalid };
        }
        if values.insert(mark.to_string()) {
            rows.push((Relation::ValidId, id.to_string(), mark.to_string()));
        }
        incoming
    }

    fn put_facts(
        &self,
        relation: Relation,
        id: &str,
        facts: &BTreeSet<String>,
        rows: &mut Vec<(Relation, String, String)>,
    ) {
        let mut values = self.table(relation).entry(id.to_string()).or_default();
        if facts.is_empty() {
            if values.is_empty() && values.insert(SENTINEL.to_string()) {
                rows.push((relation, id.to_string(), SENTINEL.to_string()));
            }
            return;
        }
        for fact in facts {
            if values.insert(fact.clone()) {
                rows.push((relation, id.to_string(), fact.clone()));
            }
        }
    }

    fn facts(&self, relation: Relation, id: &str) -> Option<BTreeSet<String>> {
        self.table(relation).get(id).map(|values| {
            values
                .iter()
                .filter(|v| !v.is_empty())
                .cloned()
                .collect()
        })
    }
}

impl DataSource for CsvDataSource {
    fn get(&self, id: &str) -> Result<Option<ResolutionRecord>, CacheError> {
        let valid = self.table(Relation::ValidId).contains_key(id);
        let date = self.facts(Relation::IdDate, id);
        let issn = self.facts(Relation::IdIssn, id);
        let orcid = self.facts(Relation::IdOrcid, id);

        if !valid && date.is_none() && issn.is_none() && orcid.is_none() {
            return Ok(None);
        }
        Ok(Some(ResolutionRecord {
            valid: self.stored_validity(id),
            date: date.unwrap_or_default(),
            issn: issn.unwrap_or_default(),
            orcid: orcid.unwrap_or_default(),
        }))
    }

    fn set(&self, id: &str, record: ResolutionRecord) -> Result<(), CacheError> {
        let mut rows = Vec::new();
        let in_force = self.put_validity(id, record.valid, &mut rows);

        if in_force == Validity::Valid {
            self.put_facts(Relation::IdDate, id, &record.date, &mut rows);
            self.put_facts(Relation::IdIssn, id, &record.issn, &mut rows);
            self.put_facts(Relation::IdOrcid, id, &record.orcid, &mut rows);
        } else if in_force == Validity::Unknown
            && !(record.date.is_empty() && record.issn.is_empty() && record.orcid.is_empty())
        {
            tracing::debug!(id, "dropping facts for an identifier not yet validated");
        }

        if !rows.is_empty() {
            self.pending
                .lock()
                .map_err(|_| CacheError::Poisoned)?
                .extend(rows);
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), CacheError> {
        let mut pending = self.pending.lock().map_err(|_| CacheError::Poisoned)?;
        if pending.is_empty() {
            return Ok(());
        }

        for relation in Relation::ALL {
            let rows: Vec<_> = pending.iter().filter(|(r, _, _)| *r == relation).collect();
            if rows.is_empty() {
                continue;
            }
            let path = self.dir.join(relation.file_name());
            let fresh = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .quote_style(csv::QuoteStyle::Always)
                .from_writer(file);
            if fresh {
                writer.write_record(["id", "value"])?;
            }
            for (_, id, value) in &rows {
                writer.write_record([id.as_str(), value.as_str()])?;
            }
            writer.flush()?;
            tracing::debug!(path = %path.display(), rows = rows.len(), "appended relation rows");
        }

        tracing::info!(dir = %self.dir.display(), rows = pending.len(), "flushed tabular cache");
        pending.clear();
        Ok(())
    }
}
