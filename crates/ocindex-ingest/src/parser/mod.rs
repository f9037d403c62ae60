//! Citation parsers, one per source format.
//!
//! Every parser materialises the rows of one file and then hands out citation
//! tuples through a pull iterator ([`CitationParser::next_citation_data`]).
//! Rows whose identifiers fail normalisation are skipped silently.

pub mod crossref;
pub mod crowdsourced;
pub mod datacite;
pub mod index;
pub mod nih;
pub mod openaire;
pub mod scholix;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::str::FromStr;

use ocindex_core::{CitationData, Scheme};
use serde::de::DeserializeOwned;

use crate::IngestError;

pub use crossref::CrossrefParser;
pub use crowdsourced::CrowdsourcedParser;
pub use datacite::{DataCiteJsonParser, DataCiteParser};
pub use index::IndexParser;
pub use nih::NihParser;
pub use openaire::{OmidMap, OpenAireParser};
pub use scholix::ScholixParser;

/// The source formats the index can ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    Crossref,
    Crowdsourced,
    DataCite,
    DataCiteJson,
    Index,
    Scholix,
    Nih,
    OpenAire,
}

impl ParserKind {
    pub const ALL: [ParserKind; 8] = [
        ParserKind::Crossref,
        ParserKind::Crowdsourced,
        ParserKind::DataCite,
        ParserKind::DataCiteJson,
        ParserKind::Index,
        ParserKind::Scholix,
        ParserKind::Nih,
        ParserKind::OpenAire,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParserKind::Crossref => "crossref",
            ParserKind::Crowdsourced => "crowdsourced",
            ParserKind::DataCite => "datacite",
            ParserKind::DataCiteJson => "datacite_json",
            ParserKind::Index => "index",
            ParserKind::Scholix => "scholix",
            ParserKind::Nih => "nih",
            ParserKind::OpenAire => "openaire",
        }
    }

    /// File-name suffix of the files this parser reads.
    pub fn extension(self) -> &'static str {
        match self {
            ParserKind::Crossref | ParserKind::DataCiteJson => ".json",
            ParserKind::Scholix => ".scholix",
            ParserKind::OpenAire => ".gz",
            ParserKind::Crowdsourced
            | ParserKind::DataCite
            | ParserKind::Index
            | ParserKind::Nih => ".csv",
        }
    }

    /// The scheme of the identifiers in the emitted tuples.
    pub fn scheme(self) -> Scheme {
        match self {
            ParserKind::Index | ParserKind::OpenAire => Scheme::Omid,
            ParserKind::Nih => Scheme::Pmid,
            _ => Scheme::Doi,
        }
    }
}

impl FromStr for ParserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ParserKind::ALL
            .into_iter()
            .find(|k| k.name() == lower)
            .ok_or_else(|| format!("unknown parser: {}", s))
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What one pull returns: a single tuple, or all tuples of one source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Citations {
    One(CitationData),
    Many(Vec<CitationData>),
}

impl IntoIterator for Citations {
    type Item = CitationData;
    type IntoIter = std::vec::IntoIter<CitationData>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Citations::One(c) => vec![c].into_iter(),
            Citations::Many(v) => v.into_iter(),
        }
    }
}

/// A parser for one source format.
pub trait CitationParser: Send {
    fn kind(&self) -> ParserKind;

    /// Whether `path` is an existing regular file with this parser's extension.
    fn is_valid(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().ends_with(self.kind().extension()))
    }

    /// Load the rows of `path`, resetting the iterator.
    fn parse(&mut self, path: &Path) -> Result<(), IngestError> {
        let bytes = std::fs::read(path)?;
        self.parse_bytes(&bytes).map_err(|e| match e {
            IngestError::MalformedInputFile { reason, .. } => IngestError::MalformedInputFile {
                path: path.to_path_buf(),
                reason,
            },
            other => IngestError::MalformedInputFile {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })
    }

    /// Load rows from in-memory content (e.g. a tar.gz member).
    fn parse_bytes(&mut self, bytes: &[u8]) -> Result<(), IngestError>;

    /// The next emittable tuple(s), or `None` once the rows are exhausted.
    fn next_citation_data(&mut self) -> Option<Citations>;

    /// Number of rows loaded by the last `parse`.
    fn items(&self) -> usize;

    /// Number of rows consumed so far.
    fn current_item(&self) -> usize;

    /// Drain the iterator.
    fn collect_all(&mut self) -> Vec<CitationData> {
        let mut out = Vec::new();
        while let Some(batch) = self.next_citation_data() {
            out.extend(batch);
        }
        out
    }
}

/// Build the parser for `kind`.
pub fn parser_for(kind: ParserKind) -> Box<dyn CitationParser> {
    parser_with_map(kind, None)
}

/// Build the parser for `kind`; the OpenAIRE parser keys citations through
/// `omids` (empty if `None`).
pub fn parser_with_map(kind: ParserKind, omids: Option<&Arc<OmidMap>>) -> Box<dyn CitationParser> {
    match kind {
        ParserKind::Crossref => Box::new(CrossrefParser::default()),
        ParserKind::Crowdsourced => Box::new(CrowdsourcedParser::default()),
        ParserKind::DataCite => Box::new(DataCiteParser::default()),
        ParserKind::DataCiteJson => Box::new(DataCiteJsonParser::default()),
        ParserKind::Index => Box::new(IndexParser::default()),
        ParserKind::Scholix => Box::new(ScholixParser::default()),
        ParserKind::Nih => Box::new(NihParser::default()),
        ParserKind::OpenAire => Box::new(OpenAireParser::new(omids.cloned().unwrap_or_default())),
    }
}

/// Materialised rows plus a forward cursor.
#[derive(Debug)]
pub(crate) struct Rows<T> {
    rows: Vec<T>,
    next: usize,
}

impl<T> Default for Rows<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next: 0,
        }
    }
}

impl<T> Rows<T> {
    pub(crate) fn reset(&mut self, rows: Vec<T>) {
        self.rows = rows;
        self.next = 0;
    }

    pub(crate) fn next_row(&mut self) -> Option<&T> {
        let row = self.rows.get(self.next)?;
        self.next += 1;
        Some(row)
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn consumed(&self) -> usize {
        self.next
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Deserialize every CSV row into `T`, dropping rows that do not fit.
pub(crate) fn read_csv_rows<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(strip_bom(bytes));
    reader.headers()?;
    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<T>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => tracing::debug!(line = line + 2, error = %e, "skipping malformed row"),
        }
    }
    Ok(rows)
}

/// Decode JSON content, replacing invalid UTF-8.
pub(crate) fn read_json(bytes: &[u8]) -> Result<serde_json::Value, IngestError> {
    Ok(serde_json::from_str(&String::from_utf8_lossy(strip_bom(bytes)))?)
}

/// Normalised DOI body, or `None`.
pub(crate) fn doi(raw: Option<&str>) -> Option<String> {
    ocindex_core::identifier::normalise(Scheme::Doi, raw?, false)
}

/// A date cell after `check_date`; empty cells are `None`.
pub(crate) fn date(raw: Option<&str>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
        .and_then(ocindex_core::check_date)
}
