use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub mod config_file;
pub mod datasource;
pub mod finder;
pub mod http;
pub mod identifier;
pub mod rate_limit;
pub mod record;
pub mod retry;

// Re-export for convenience
pub use datasource::{CacheError, CsvDataSource, DataSource, MemoryDataSource, RedisDataSource};
pub use finder::{FinderChain, ResourceFinder};
pub use http::ApiClient;
pub use identifier::{IdentifierManager, Scheme};
pub use rate_limit::{RateLimiters, Remote};
pub use record::{ResolutionRecord, Validity};
pub use retry::{AttemptError, Outcome, RetryPolicy};

/// One citation as produced by a parser and consumed by the emitters.
///
/// `citing` and `cited` are normalised identifiers, prefixed or bare depending
/// on the parser that built the tuple. Self-citation flags are tri-state:
/// `None` means unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CitationData {
    pub citing: String,
    pub cited: String,
    pub citing_date: Option<String>,
    pub cited_date: Option<String>,
    pub journal_self_citation: Option<bool>,
    pub author_self_citation: Option<bool>,
}

impl CitationData {
    /// A tuple with only the two endpoints known.
    pub fn new(citing: impl Into<String>, cited: impl Into<String>) -> Self {
        Self {
            citing: citing.into(),
            cited: cited.into(),
            citing_date: None,
            cited_date: None,
            journal_self_citation: None,
            author_self_citation: None,
        }
    }

    pub fn with_dates(mut self, citing_date: Option<String>, cited_date: Option<String>) -> Self {
        self.citing_date = citing_date;
        self.cited_date = cited_date;
        self
    }
}

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}(-[0-9]{2}(-[0-9]{2})?)?$").unwrap());

/// Clean up a publication date coming from an input file.
///
/// Whitespace is removed, only the first ten characters are kept, and the
/// result must be `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
pub fn check_date(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let head: String = compact.chars().take(10).collect();
    if DATE_RE.is_match(&head) {
        Some(head)
    } else {
        None
    }
}

/// Render a `(year, month, day)` triple as an ISO date fragment.
///
/// A month or day of `1` in trailing position is the upstream default and
/// gets dropped, so `(2015, 1, 1)` renders as `2015` and `(2015, 3, 1)` as
/// `2015-03`. Out-of-range components truncate the date at that point.
pub fn render_date(year: i64, month: Option<i64>, day: Option<i64>) -> Option<String> {
    if !(0..=9999).contains(&year) {
        return None;
    }
    let month = month.filter(|m| (1..=12).contains(m));
    let day = month.and(day).filter(|d| (1..=31).contains(d));

    let day = day.filter(|&d| d != 1);
    let month = match (month, day) {
        (Some(1), None) => None,
        (m, _) => m,
    };

    Some(match (month, day) {
        (Some(m), Some(d)) => format!("{year:04}-{m:02}-{d:02}"),
        (Some(m), None) => format!("{year:04}-{m:02}"),
        _ => format!("{year:04}"),
    })
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unparseable identifier: {0}")]
    UnparseableIdentifier(String),
    #[error("remote service unavailable: {0}")]
    RemoteTransient(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Which storage a service's resolution cache lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Csv,
    Redis,
}

/// Connection settings for the key-value server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub batch_size: usize,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6379,
            db: 0,
            batch_size: 50_000,
        }
    }
}

/// Per-service settings: which parser reads its dumps, which finders
/// resolve its identifiers, and where its glob lives.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub parser: String,
    pub finders: Vec<String>,
    /// Supplier prefix of the service's OCIs; empty for OMID-keyed services.
    pub prefix: String,
    pub cache_dir: PathBuf,
    pub backend: Backend,
}

/// Runtime configuration, built once at program start and passed down.
#[derive(Clone)]
pub struct Config {
    pub mailto: Option<String>,
    pub orcid_api_key: Option<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub connect_backoff: Duration,
    pub use_api_service: bool,
    pub parse_workers: usize,
    pub resolve_workers: usize,
    pub redis: RedisConfig,
    pub data_dir: PathBuf,
    pub services: HashMap<String, ServiceConfig>,
    pub rate_limiters: Arc<RateLimiters>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("mailto", &self.mailto)
            .field("orcid_api_key", &self.orcid_api_key.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("connect_backoff", &self.connect_backoff)
            .field("use_api_service", &self.use_api_service)
            .field("parse_workers", &self.parse_workers)
            .field("resolve_workers", &self.resolve_workers)
            .field("redis", &self.redis)
            .field("data_dir", &self.data_dir)
            .field("services", &self.services)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mailto: None,
            orcid_api_key: None,
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            connect_backoff: Duration::from_secs(5),
            use_api_service: true,
            parse_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            resolve_workers: 16,
            redis: RedisConfig::default(),
            data_dir: config_file::default_data_dir(),
            services: default_services(&config_file::default_data_dir()),
            rate_limiters: Arc::new(RateLimiters::default()),
        }
    }
}

impl Config {
    /// The retry policy every remote call uses.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            timeout: self.timeout,
            connect_backoff: self.connect_backoff,
        }
    }

    /// Settings for a service tag, falling back to the built-in defaults.
    pub fn service(&self, tag: &str) -> Option<&ServiceConfig> {
        self.services.get(&tag.to_lowercase())
    }
}

/// The services OpenCitations runs, with their parsers and finders.
pub fn default_services(data_dir: &Path) -> HashMap<String, ServiceConfig> {
    let table: [(&str, &str, &[&str], &str); 7] = [
        ("coci", "crossref", &["crossref", "orcid"], "020"),
        ("doci", "datacite", &["datacite", "orcid"], "080"),
        ("croci", "crowdsourced", &["crossref", "datacite", "orcid"], "050"),
        ("oaoci", "scholix", &["crossref", "datacite"], ""),
        ("noci", "nih", &["nih", "orcid"], "0160"),
        ("ioci", "index", &["ocmeta"], ""),
        ("oroci", "openaire", &["ocmeta"], ""),
    ];
    table
        .into_iter()
        .map(|(tag, parser, finders, prefix)| {
            (
                tag.to_string(),
                ServiceConfig {
                    parser: parser.to_string(),
                    finders: finders.iter().map(|f| f.to_string()).collect(),
                    prefix: prefix.to_string(),
                    cache_dir: data_dir.join(tag),
                    backend: Backend::Csv,
                },
            )
        })
        .collect()
}

/// Open the resolution cache a service is configured with.
pub fn build_data_source(
    service: &ServiceConfig,
    redis: &RedisConfig,
) -> Result<Arc<dyn DataSource>, CacheError> {
    match service.backend {
        Backend::Csv => {
            let source = CsvDataSource::open(&service.cache_dir)?;
            tracing::info!(path = %service.cache_dir.display(), ids = source.len(), "opened tabular cache");
            Ok(Arc::new(source))
        }
        Backend::Redis => {
            let source = RedisDataSource::open(&redis.url())?;
            tracing::info!(host = %redis.host, port = redis.port, db = redis.db, "opened network cache");
            Ok(Arc::new(source))
        }
    }
}
