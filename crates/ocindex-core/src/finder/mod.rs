//! Resource finders: fetch upstream metadata for an identifier and turn it
//! into a [`ResolutionRecord`].
//!
//! Finders never touch the cache; the glob builder stores what they return.

pub mod crossref;
pub mod datacite;
pub mod mock;
pub mod nih;
pub mod ocmeta;
pub mod orcid;
pub mod wikidata;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::datasource::DataSource;
use crate::http::ApiClient;
use crate::identifier::{self, IdentifierManager, ValidityMemo, Scheme};
use crate::record::{ResolutionRecord, Validity};
use crate::retry::Outcome;
use crate::{Config, CoreError};

pub use crossref::CrossrefFinder;
pub use datacite::DataCiteFinder;
pub use nih::NihFinder;
pub use ocmeta::OcMetaFinder;
pub use orcid::OrcidFinder;
pub use wikidata::WikidataFinder;

/// Name sent in the `User-Agent` of every finder request.
pub(crate) const FINDER_TOOL: &str = "ResourceFinder";

pub type FinderFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ResolutionRecord, CoreError>> + Send + 'a>>;

/// A metadata service that can describe identifiers of one scheme.
pub trait ResourceFinder: Send + Sync {
    /// Service name (e.g. "Crossref", "ORCID").
    fn name(&self) -> &str;

    /// The scheme of the identifiers this finder accepts.
    fn scheme(&self) -> Scheme;

    /// Look `id` up. Validity is `Unknown` when the service cannot tell.
    fn fetch<'a>(&'a self, id: &'a str) -> FinderFuture<'a>;
}

/// Normalise `id` for `scheme` or fail with `UnparseableIdentifier`.
pub(crate) fn require_body(scheme: Scheme, id: &str) -> Result<String, CoreError> {
    identifier::normalise(scheme, id, false)
        .ok_or_else(|| CoreError::UnparseableIdentifier(id.to_string()))
}

/// Turn a payload outcome into a record.
///
/// A payload means the service knows the identifier; a definitive miss tells
/// nothing about validity; exhausted retries become `RemoteTransient`.
pub(crate) fn record_from<T>(
    id: &str,
    outcome: Outcome<T>,
    found_validity: Validity,
    extract: impl FnOnce(&T) -> ResolutionRecord,
) -> Result<ResolutionRecord, CoreError> {
    match outcome {
        Outcome::Found(payload) => {
            let mut record = extract(&payload);
            record.valid = found_validity;
            Ok(record)
        }
        Outcome::NotFound => Ok(ResolutionRecord::default()),
        Outcome::Exhausted(e) => Err(CoreError::RemoteTransient(format!("{}: {}", id, e))),
    }
}

/// Keep only values that normalise and pass the check digit.
pub(crate) fn checked<'a>(
    values: impl IntoIterator<Item = &'a str>,
    normalise: fn(&str) -> Option<String>,
    check: fn(&str) -> bool,
) -> impl Iterator<Item = String> {
    values
        .into_iter()
        .filter_map(normalise)
        .filter(move |v| check(v))
}

/// The finders configured for one scheme, queried in order.
///
/// Records are merged; if no finder could settle validity, the identifier
/// manager's existence check decides.
pub struct FinderChain {
    scheme: Scheme,
    manager: Arc<dyn IdentifierManager>,
    finders: Vec<Arc<dyn ResourceFinder>>,
}

impl FinderChain {
    pub fn new(
        scheme: Scheme,
        manager: Arc<dyn IdentifierManager>,
        finders: Vec<Arc<dyn ResourceFinder>>,
    ) -> Self {
        Self {
            scheme,
            manager,
            finders: finders
                .into_iter()
                .filter(|f| f.scheme() == scheme)
                .collect(),
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn manager(&self) -> &Arc<dyn IdentifierManager> {
        &self.manager
    }

    pub fn finder_names(&self) -> Vec<&str> {
        self.finders.iter().map(|f| f.name()).collect()
    }

    /// Resolve `id` through every finder and settle its validity.
    pub async fn fetch(&self, id: &str) -> Result<ResolutionRecord, CoreError> {
        require_body(self.scheme, id)?;
        let mut record = ResolutionRecord::default();

        for finder in &self.finders {
            match finder.fetch(id).await {
                Ok(found) => {
                    record.merge(&found);
                }
                Err(CoreError::RemoteTransient(msg)) => {
                    tracing::warn!(finder = finder.name(), id, error = %msg, "finder gave up");
                }
                Err(e) => return Err(e),
            }
        }

        if !record.valid.is_known() {
            let valid = self.manager.is_valid(id).await;
            record.merge(&ResolutionRecord {
                valid: Validity::from(valid),
                ..Default::default()
            });
        }
        Ok(record)
    }
}

/// Instantiate the finder registered under `name` for `scheme`.
///
/// `Ok(None)` means the finder has nothing to say about `scheme`, or it
/// needs the network and `api` is `None`. `meta` is the OpenCitations Meta
/// data map the `ocmeta` finder answers from.
pub fn finder_for(
    name: &str,
    scheme: Scheme,
    api: Option<&Arc<ApiClient>>,
    config: &Config,
    meta: Option<&Arc<dyn DataSource>>,
) -> Result<Option<Arc<dyn ResourceFinder>>, CoreError> {
    let finder: Option<Arc<dyn ResourceFinder>> = match name.to_lowercase().as_str() {
        "crossref" => api
            .filter(|_| scheme == Scheme::Doi)
            .map(|api| Arc::new(CrossrefFinder::new(api.clone())) as _),
        "datacite" => api
            .filter(|_| scheme == Scheme::Doi)
            .map(|api| Arc::new(DataCiteFinder::new(api.clone())) as _),
        "nih" | "pubmed" => api
            .filter(|_| scheme == Scheme::Pmid)
            .map(|api| Arc::new(NihFinder::new(api.clone())) as _),
        "orcid" => api.and_then(|api| {
            let key = config.orcid_api_key.clone();
            match scheme {
                Scheme::Doi => Some(Arc::new(OrcidFinder::by_doi(api.clone(), key)) as _),
                Scheme::Pmid => Some(Arc::new(OrcidFinder::by_pmid(api.clone(), key)) as _),
                _ => None,
            }
        }),
        "wikidata" => api.and_then(|api| match scheme {
            Scheme::Doi => Some(Arc::new(WikidataFinder::by_doi(api.clone())) as _),
            Scheme::Wikidata => Some(Arc::new(WikidataFinder::by_qid(api.clone())) as _),
            _ => None,
        }),
        "ocmeta" => {
            let data = meta.ok_or_else(|| {
                CoreError::Config("the ocmeta finder needs a Meta data map".into())
            })?;
            Some(Arc::new(OcMetaFinder::new(data.clone(), scheme)) as _)
        }
        other => return Err(CoreError::Config(format!("unknown finder: {}", other))),
    };
    Ok(finder)
}

impl FinderChain {
    /// Build the chain a service configuration names.
    ///
    /// The identifier manager memoises its checks in `memo`; for OMIDs the
    /// Meta data map doubles as the validity oracle.
    pub fn from_names(
        scheme: Scheme,
        names: &[String],
        api: Option<&Arc<ApiClient>>,
        config: &Config,
        meta: Option<&Arc<dyn DataSource>>,
        memo: ValidityMemo,
    ) -> Result<Self, CoreError> {
        let memo = match (scheme, meta) {
            (Scheme::Omid, Some(data)) => ValidityMemo::new(data),
            _ => memo,
        };
        let manager = identifier::manager_for(scheme, api.cloned(), memo);
        let mut finders = Vec::new();
        for name in names {
            match finder_for(name, scheme, api, config, meta)? {
                Some(finder) => finders.push(finder),
                None => tracing::debug!(finder = %name, %scheme, "finder not used"),
            }
        }
        Ok(Self::new(scheme, manager, finders))
    }
}

/// The first date any record knows, in chain order.
pub fn get_date<'a>(records: impl IntoIterator<Item = &'a ResolutionRecord>) -> Option<String> {
    records
        .into_iter()
        .find_map(|r| r.first_date().map(str::to_string))
}

/// `Some(true)` when both records list a common ISSN, `None` if either has none.
pub fn share_issn(a: &ResolutionRecord, b: &ResolutionRecord) -> Option<bool> {
    if a.issn.is_empty() || b.issn.is_empty() {
        return None;
    }
    Some(!a.issn.is_disjoint(&b.issn))
}

/// `Some(true)` when both records list a common ORCID, `None` if either has none.
pub fn share_orcid(a: &ResolutionRecord, b: &ResolutionRecord) -> Option<bool> {
    if a.orcid.is_empty() || b.orcid.is_empty() {
        return None;
    }
    Some(!a.orcid.is_disjoint(&b.orcid))
}

#[cfg(test)]
mod tests {
    use super::mock::{MockFinder, MockResponse};
    use super::*;
    use crate::datasource::{DataSource, MemoryDataSource};
    use crate::identifier::{DoiManager, ValidityMemo};

    /// Offline DOI manager whose memo already knows `valid`.
    fn doi_manager_knowing(valid: &[&str]) -> (Arc<dyn DataSource>, Arc<dyn IdentifierManager>) {
        let cache: Arc<dyn DataSource> = Arc::new(MemoryDataSource::new());
        for id in valid {
            cache.set(id, ResolutionRecord::valid()).unwrap();
        }
        let manager = Arc::new(DoiManager::new(None, ValidityMemo::new(&cache)));
        (cache, manager)
    }

    #[tokio::test]
    async fn chain_merges_finder_records() {
        let crossref = Arc::new(MockFinder::new(
            "Crossref",
            Scheme::Doi,
            MockResponse::Found(ResolutionRecord::valid().with_date("2019").with_issn("0317-8471")),
        ));
        let orcid = Arc::new(MockFinder::new(
            "ORCID",
            Scheme::Doi,
            MockResponse::Found(ResolutionRecord::default().with_orcid("0000-0002-1825-0097")),
        ));
        let (_cache, manager) = doi_manager_knowing(&[]);
        let chain = FinderChain::new(
            Scheme::Doi,
            manager,
            vec![crossref.clone(), orcid.clone()],
        );

        let rec = chain.fetch("10.1/a").await.unwrap();
        assert!(rec.is_valid());
        assert!(rec.issn.contains("0317-8471"));
        assert!(rec.orcid.contains("0000-0002-1825-0097"));
        assert_eq!(crossref.call_count(), 1);
        assert_eq!(orcid.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_validity_falls_back_to_manager() {
        let orcid = Arc::new(MockFinder::new(
            "ORCID",
            Scheme::Doi,
            MockResponse::Found(ResolutionRecord::default().with_orcid("0000-0002-1825-0097")),
        ));
        let (_cache, manager) = doi_manager_knowing(&["doi:10.1/known"]);
        let chain = FinderChain::new(
            Scheme::Doi,
            manager,
            vec![orcid],
        );

        assert!(chain.fetch("10.1/known").await.unwrap().is_valid());
        let unknown = chain.fetch("10.1/unknown").await.unwrap();
        assert_eq!(unknown, ResolutionRecord::invalid());
    }

    #[tokio::test]
    async fn transient_failures_do_not_abort_chain() {
        let flaky = Arc::new(MockFinder::new(
            "Crossref",
            Scheme::Doi,
            MockResponse::Transient("timed out".into()),
        ));
        let datacite = Arc::new(MockFinder::new(
            "DataCite",
            Scheme::Doi,
            MockResponse::Found(ResolutionRecord::valid().with_date("2001")),
        ));
        let (_cache, manager) = doi_manager_knowing(&[]);
        let chain = FinderChain::new(Scheme::Doi, manager, vec![flaky, datacite]);
        let rec = chain.fetch("10.1/a").await.unwrap();
        assert!(rec.is_valid());
        assert_eq!(rec.first_date(), Some("2001"));
    }

    #[tokio::test]
    async fn unparseable_ids_are_rejected_before_any_call() {
        let finder = Arc::new(MockFinder::new(
            "Crossref",
            Scheme::Doi,
            MockResponse::Found(ResolutionRecord::valid()),
        ));
        let (_cache, manager) = doi_manager_knowing(&[]);
        let chain = FinderChain::new(Scheme::Doi, manager, vec![finder.clone()]);
        assert!(matches!(
            chain.fetch("not a doi").await,
            Err(CoreError::UnparseableIdentifier(_))
        ));
        assert_eq!(finder.call_count(), 0);
    }

    #[test]
    fn registry_skips_remote_finders_offline() {
        let config = Config::default();
        assert!(finder_for("crossref", Scheme::Doi, None, &config, None).unwrap().is_none());
        assert!(finder_for("nope", Scheme::Doi, None, &config, None).is_err());
        assert!(finder_for("ocmeta", Scheme::Omid, None, &config, None).is_err());
        assert!(finder_for("wikidata", Scheme::Wikidata, None, &config, None).unwrap().is_none());

        let meta: Arc<dyn DataSource> = Arc::new(MemoryDataSource::new());
        let chain = FinderChain::from_names(
            Scheme::Omid,
            &["ocmeta".to_string(), "orcid".to_string()],
            None,
            &config,
            Some(&meta),
            ValidityMemo::none(),
        )
        .unwrap();
        assert_eq!(chain.finder_names(), vec!["OpenCitations Meta"]);
    }

    #[test]
    fn wikidata_serves_dois_and_qids() {
        let api = Arc::new(ApiClient::with_client(
            reqwest::Client::new(),
            crate::retry::RetryPolicy::default(),
            Arc::new(crate::rate_limit::RateLimiters::default()),
            None,
        ));
        let config = Config::default();
        for scheme in [Scheme::Doi, Scheme::Wikidata] {
            let finder = finder_for("Wikidata", scheme, Some(&api), &config, None)
                .unwrap()
                .unwrap();
            assert_eq!(finder.scheme(), scheme);
        }
        assert!(finder_for("wikidata", Scheme::Pmid, Some(&api), &config, None).unwrap().is_none());
    }

    #[test]
    fn chain_drops_finders_for_other_schemes() {
        let pmid = Arc::new(MockFinder::new(
            "PubMed",
            Scheme::Pmid,
            MockResponse::Found(ResolutionRecord::valid()),
        ));
        let (_cache, manager) = doi_manager_knowing(&[]);
        let chain = FinderChain::new(Scheme::Doi, manager, vec![pmid]);
        assert!(chain.finder_names().is_empty());
    }

    // ── self-citation helpers ──────────────────────────────────────────

    #[test]
    fn share_issn_and_orcid() {
        let a = ResolutionRecord::valid().with_issn("0317-8471").with_orcid("o1");
        let b = ResolutionRecord::valid().with_issn("0317-8471").with_orcid("o2");
        let c = ResolutionRecord::valid();
        assert_eq!(share_issn(&a, &b), Some(true));
        assert_eq!(share_orcid(&a, &b), Some(false));
        assert_eq!(share_issn(&a, &c), None);
    }

    #[test]
    fn get_date_takes_first_dated_record() {
        let a = ResolutionRecord::valid();
        let b = ResolutionRecord::valid().with_date("2010");
        assert_eq!(get_date([&a, &b]), Some("2010".into()));
        assert_eq!(get_date([&a]), None);
    }
}
