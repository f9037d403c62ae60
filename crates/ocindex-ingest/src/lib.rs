//! Turning citation dumps into citation tuples and a populated glob.
//!
//! The pipeline is [`preprocess`] (enumerate and decode input members) →
//! [`parser`] (one pull iterator per source format) → [`glob`] (resolve every
//! identifier through the cache and resource finders) → [`emit`] (write the
//! enriched citation table, or store citations keyed by their [`oci`]).
//! [`validate`] filters citation tables down to OCIs not yet indexed.

pub mod emit;
pub mod glob;
pub mod metadata;
pub mod oci;
pub mod parser;
pub mod preprocess;
pub mod validate;

use std::path::PathBuf;

use ocindex_core::CacheError;
use thiserror::Error;

pub use emit::{
    Citation, CitationSink, CitationStorer, CitationWriter, EmitReport, StorerSettings,
    emit_citations, store_citations,
};
pub use glob::{GlobBuilder, GlobOutput, GlobProgress, GlobReport};
pub use metadata::{check_metadata, parse_field_path};
pub use oci::{LOOKUP_FILE, OciLookup, OciMinter};
pub use parser::{CitationParser, Citations, OmidMap, ParserKind, parser_for, parser_with_map};
pub use preprocess::{Member, TarHandle, get_all_files, load_json, read_member};
pub use validate::{
    ValidateReport, answer_query, build_oci_query, known_ocis, validate_against, validate_citations,
};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("unsupported input: {}", .0.display())]
    UnsupportedInput(PathBuf),
    #[error("cannot load {}: {reason}", path.display())]
    MalformedInputFile { path: PathBuf, reason: String },
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error(transparent)]
    Core(#[from] ocindex_core::CoreError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("cancelled")]
    Cancelled,
}
