//! The global citation index: cited entity → citing entity → sources.
//!
//! [`GlobalIndex`] is the in-memory form; [`push_global_index`] streams a
//! dump into a list-valued store (`RPUSH cited citing`) in batches.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::source::{find_inputs, for_each_line};
use crate::triple::parse_line;
use crate::{RdfError, RdfProgress};

/// Operations per list-store batch.
pub const BATCH_SIZE: usize = 50_000;

type Citing = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalIndex {
    entries: BTreeMap<String, Citing>,
}

impl GlobalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `citing` cites `cited`, seen in `source`.
    pub fn absorb(&mut self, citing: &str, cited: &str, source: Option<&str>) {
        let sources = self
            .entries
            .entry(cited.to_string())
            .or_default()
            .entry(citing.to_string())
            .or_default();
        if let Some(source) = source {
            sources.insert(source.to_string());
        }
    }

    /// Absorb a triple line; `false` if it names no citation.
    pub fn absorb_line(&mut self, line: &str) -> bool {
        match parse_line(line) {
            Some(c) => {
                self.absorb(c.citing, c.cited, c.source);
                true
            }
            None => false,
        }
    }

    /// Fold `other` in; citing sets and source sets are unioned.
    pub fn merge(&mut self, other: GlobalIndex) {
        for (cited, citing) in other.entries {
            let mine = self.entries.entry(cited).or_default();
            for (id, sources) in citing {
                mine.entry(id).or_default().extend(sources);
            }
        }
    }

    /// Citing entities of `cited`, with the sources each citation came from.
    pub fn citing(&self, cited: &str) -> Option<&Citing> {
        self.entries.get(cited)
    }

    /// Number of distinct citing entities per cited entity.
    pub fn citation_counts(&self) -> BTreeMap<String, usize> {
        self.entries
            .iter()
            .map(|(cited, citing)| (cited.clone(), citing.len()))
            .collect()
    }

    /// `(cited, citing)` pairs in key order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(cited, citing)| {
            citing.keys().map(move |c| (cited.as_str(), c.as_str()))
        })
    }

    /// Number of cited entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A store of append-only string lists.
pub trait ListStore {
    /// Append each `(key, value)` to the list at `key`, as one round trip.
    fn rpush_batch(&mut self, ops: &[(String, String)]) -> Result<(), RdfError>;
}

/// Lists on a Redis-compatible server.
pub struct RedisListStore {
    conn: redis::Connection,
}

impl RedisListStore {
    /// Connect to `url` (`redis://host:port/db`).
    pub fn open(url: &str) -> Result<Self, RdfError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            conn: client.get_connection()?,
        })
    }
}

impl ListStore for RedisListStore {
    fn rpush_batch(&mut self, ops: &[(String, String)]) -> Result<(), RdfError> {
        let mut pipe = redis::pipe();
        for (key, value) in ops {
            pipe.rpush(key, value).ignore();
        }
        pipe.query::<()>(&mut self.conn)?;
        Ok(())
    }
}

/// In-process lists, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryListStore {
    pub lists: HashMap<String, Vec<String>>,
    pub batches: usize,
}

impl ListStore for MemoryListStore {
    fn rpush_batch(&mut self, ops: &[(String, String)]) -> Result<(), RdfError> {
        for (key, value) in ops {
            self.lists.entry(key.clone()).or_default().push(value.clone());
        }
        self.batches += 1;
        Ok(())
    }
}

/// Buffers push operations and sends them `batch_size` at a time.
pub struct BatchPusher<'s> {
    store: &'s mut dyn ListStore,
    pending: Vec<(String, String)>,
    batch_size: usize,
    pushed: usize,
}

impl<'s> BatchPusher<'s> {
    pub fn new(store: &'s mut dyn ListStore, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            pending: Vec::with_capacity(batch_size.min(BATCH_SIZE)),
            batch_size,
            pushed: 0,
        }
    }

    /// Queue one operation; returns the batch size when a batch went out.
    pub fn push(&mut self, key: &str, value: &str) -> Result<Option<usize>, RdfError> {
        self.pending.push((key.to_string(), value.to_string()));
        if self.pending.len() >= self.batch_size {
            return self.flush().map(Some);
        }
        Ok(None)
    }

    /// Send whatever is queued.
    pub fn flush(&mut self) -> Result<usize, RdfError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        self.store.rpush_batch(&self.pending)?;
        let sent = self.pending.len();
        self.pushed += sent;
        self.pending.clear();
        tracing::debug!(operations = sent, total = self.pushed, "flushed list batch");
        Ok(sent)
    }

    /// Operations sent so far.
    pub fn pushed(&self) -> usize {
        self.pushed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub files: usize,
    pub citations: usize,
    pub operations: usize,
    pub skipped_lines: usize,
}

/// Push every citation of the `.ttl` files in `input_dir` into `store`.
///
/// Each file is collapsed into a [`GlobalIndex`] first, so a citation stated
/// on several lines of one file is pushed once.
pub fn push_global_index(
    input_dir: &Path,
    store: &mut dyn ListStore,
    batch_size: usize,
    mut progress: impl FnMut(RdfProgress),
) -> Result<PushReport, RdfError> {
    let inputs = find_inputs(input_dir, ".ttl", false);
    progress(RdfProgress::Discovered {
        files: inputs.len(),
    });

    let mut report = PushReport::default();
    let mut pusher = BatchPusher::new(store, batch_size);
    for path in &inputs {
        let mut index = GlobalIndex::new();
        let stats = for_each_line(path, ".ttl", |line| {
            index.absorb_line(line);
        })?;
        report.skipped_lines += stats.skipped;

        for (cited, citing) in index.pairs() {
            report.citations += 1;
            if let Some(operations) = pusher.push(cited, citing)? {
                progress(RdfProgress::Flushed { operations });
            }
        }
        report.files += 1;
        tracing::info!(path = %path.display(), cited = index.len(), "pushed file citations");
        progress(RdfProgress::FileDone {
            file: path.display().to_string(),
            lines: stats.lines,
            skipped: stats.skipped,
        });
    }

    let last = pusher.flush()?;
    if last > 0 {
        progress(RdfProgress::Flushed { operations: last });
    }
    report.operations = pusher.pushed();
    progress(RdfProgress::Finished {
        files: report.files,
        records: report.operations,
    });
    Ok(report)
}
