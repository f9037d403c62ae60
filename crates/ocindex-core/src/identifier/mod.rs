//! Identifier managers: normalisation, check digits and existence checks.
//!
//! Each scheme lives in its own module exposing free `normalise`/check
//! functions plus a manager type implementing [`IdentifierManager`].
//! Managers for schemes with a remote check hold an optional [`ApiClient`]
//! and a [`ValidityMemo`] that remembers earlier decisions in the shared cache.

pub mod doi;
pub mod isbn;
pub mod issn;
pub mod metaid;
pub mod omid;
pub mod orcid;
pub mod pmid;
pub mod wikidata;

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use crate::datasource::DataSource;
use crate::http::ApiClient;
use crate::record::{ResolutionRecord, Validity};
use crate::retry::Outcome;

pub use doi::DoiManager;
pub use isbn::IsbnManager;
pub use issn::IssnManager;
pub use metaid::MetaIdManager;
pub use omid::OmidManager;
pub use orcid::OrcidManager;
pub use pmid::PmidManager;
pub use wikidata::WikidataManager;

/// Name sent in the `User-Agent` of every existence check.
pub(crate) const CHECK_TOOL: &str = "Identifier Manager";

pub type ValidityFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// The identifier schemes the index understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    Doi,
    Issn,
    Isbn,
    Orcid,
    Pmid,
    Omid,
    Meta,
    Wikidata,
}

impl Scheme {
    pub const ALL: [Scheme; 8] = [
        Scheme::Doi,
        Scheme::Issn,
        Scheme::Isbn,
        Scheme::Orcid,
        Scheme::Pmid,
        Scheme::Omid,
        Scheme::Meta,
        Scheme::Wikidata,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scheme::Doi => "doi",
            Scheme::Issn => "issn",
            Scheme::Isbn => "isbn",
            Scheme::Orcid => "orcid",
            Scheme::Pmid => "pmid",
            Scheme::Omid => "omid",
            Scheme::Meta => "meta",
            Scheme::Wikidata => "wikidata",
        }
    }

    /// The `scheme:` prefix used when identifiers are keyed externally.
    pub fn prefix(self) -> &'static str {
        match self {
            Scheme::Doi => "doi:",
            Scheme::Issn => "issn:",
            Scheme::Isbn => "isbn:",
            Scheme::Orcid => "orcid:",
            Scheme::Pmid => "pmid:",
            Scheme::Omid => "omid:",
            Scheme::Meta => "meta:",
            Scheme::Wikidata => "wikidata:",
        }
    }

    /// Split a prefixed identifier into its scheme and body.
    pub fn split(prefixed: &str) -> Option<(Scheme, &str)> {
        let (name, body) = prefixed.split_once(':')?;
        let scheme = name.parse().ok()?;
        Some((scheme, body))
    }

    pub(crate) fn with_prefix(self, body: String, include_prefix: bool) -> String {
        if include_prefix {
            format!("{}{}", self.prefix(), body)
        } else {
            body
        }
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Scheme::ALL
            .into_iter()
            .find(|scheme| scheme.name() == lower)
            .ok_or_else(|| format!("unknown identifier scheme: {}", s))
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Normalisation and validation for one identifier scheme.
pub trait IdentifierManager: Send + Sync {
    fn scheme(&self) -> Scheme;

    /// Canonical form of `raw`, or `None` when it cannot be parsed.
    fn normalise(&self, raw: &str, include_prefix: bool) -> Option<String>;

    /// Whether `raw` is a syntactically valid identifier that exists.
    fn is_valid<'a>(&'a self, raw: &'a str) -> ValidityFuture<'a>;
}

/// A weak handle on the resolution cache used to memoise check results.
#[derive(Clone, Default)]
pub struct ValidityMemo {
    cache: Option<Weak<dyn DataSource>>,
}

impl ValidityMemo {
    pub fn new(cache: &Arc<dyn DataSource>) -> Self {
        Self {
            cache: Some(Arc::downgrade(cache)),
        }
    }

    /// No memoisation: every call checks.
    pub fn none() -> Self {
        Self::default()
    }

    /// A concrete decision stored for `prefixed`, if any.
    pub fn lookup(&self, prefixed: &str) -> Option<bool> {
        let cache = self.cache.as_ref()?.upgrade()?;
        match cache.get(prefixed) {
            Ok(Some(record)) => record.valid.as_bool(),
            Ok(None) => None,
            Err(e) => {
                tracing::error!(id = prefixed, error = %e, "memo lookup failed");
                None
            }
        }
    }

    pub fn remember(&self, prefixed: &str, valid: bool) {
        let Some(cache) = self.cache.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let record = ResolutionRecord {
            valid: Validity::from(valid),
            ..Default::default()
        };
        if let Err(e) = cache.set(prefixed, record) {
            tracing::error!(id = prefixed, error = %e, "memo write failed");
        }
    }
}

/// Answer from the memo if possible, otherwise run `check` and remember it.
///
/// Exhausted attempts count as a negative answer and are remembered too.
pub(crate) async fn memoised_check<Fut>(
    memo: &ValidityMemo,
    prefixed: &str,
    check: Option<Fut>,
) -> bool
where
    Fut: Future<Output = Outcome<bool>>,
{
    if let Some(known) = memo.lookup(prefixed) {
        tracing::trace!(id = prefixed, valid = known, "check memo hit");
        return known;
    }
    let Some(check) = check else {
        return false;
    };

    let valid = match check.await {
        Outcome::Found(v) => v,
        Outcome::NotFound => false,
        Outcome::Exhausted(e) => {
            tracing::warn!(id = prefixed, error = %e, "existence check gave up");
            false
        }
    };
    memo.remember(prefixed, valid);
    valid
}

/// Build the manager for `scheme`.
///
/// `api` is `None` when remote checks are disabled.
pub fn manager_for(
    scheme: Scheme,
    api: Option<Arc<ApiClient>>,
    memo: ValidityMemo,
) -> Arc<dyn IdentifierManager> {
    match scheme {
        Scheme::Doi => Arc::new(DoiManager::new(api, memo)),
        Scheme::Issn => Arc::new(IssnManager),
        Scheme::Isbn => Arc::new(IsbnManager),
        Scheme::Orcid => Arc::new(OrcidManager),
        Scheme::Pmid => Arc::new(PmidManager::new(api, memo)),
        Scheme::Omid => Arc::new(OmidManager::new(memo)),
        Scheme::Meta => Arc::new(MetaIdManager::new(api, memo)),
        Scheme::Wikidata => Arc::new(WikidataManager::new(api, memo)),
    }
}

/// Normalise without constructing a manager; checks are not needed for this.
pub fn normalise(scheme: Scheme, raw: &str, include_prefix: bool) -> Option<String> {
    let body = match scheme {
        Scheme::Doi => doi::normalise(raw),
        Scheme::Issn => issn::normalise(raw),
        Scheme::Isbn => isbn::normalise(raw),
        Scheme::Orcid => orcid::normalise(raw),
        Scheme::Pmid => pmid::normalise(raw),
        Scheme::Omid => omid::normalise(raw),
        Scheme::Meta => metaid::normalise(raw),
        Scheme::Wikidata => wikidata::normalise(raw),
    }?;
    Some(scheme.with_prefix(body, include_prefix))
}

/// Remove whitespace and NUL characters.
pub(crate) fn strip_noise(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace() && *c != '\0').collect()
}

/// Percent-decode, replacing invalid UTF-8.
fn unquote(s: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}

/// Strip noise and percent-decode until neither changes the string, so a
/// doubly-encoded body (`%2541`) decodes all the way and a second pass over
/// the result is a no-op. Every step that changes the string shortens it.
pub(crate) fn decode_stable(raw: &str) -> String {
    let mut current = strip_noise(raw);
    loop {
        let next = strip_noise(&unquote(&current));
        if next == current {
            return current;
        }
        current = next;
    }
}
