use once_cell::sync::Lazy;
use regex::Regex;

use super::{IdentifierManager, ValidityMemo, Scheme, ValidityFuture, strip_noise};

static OMID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^br/[0-9]+$").unwrap());
static NONZERO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^br/0*[1-9][0-9]*$").unwrap());

/// `br/NNN` body, cut from wherever `br/` first appears.
pub fn normalise(raw: &str) -> Option<String> {
    let lower = strip_noise(raw).to_lowercase();
    let start = lower.find("br/")?;
    let body = &lower[start..];
    OMID_RE.is_match(body).then(|| body.to_string())
}

/// OMIDs are minted by OpenCitations Meta; validity comes from the data map
/// the manager is built with, and an OMID absent from it is invalid.
pub struct OmidManager {
    data: ValidityMemo,
}

impl OmidManager {
    pub fn new(data: ValidityMemo) -> Self {
        Self { data }
    }
}

impl IdentifierManager for OmidManager {
    fn scheme(&self) -> Scheme {
        Scheme::Omid
    }

    fn normalise(&self, raw: &str, include_prefix: bool) -> Option<String> {
        normalise(raw).map(|body| Scheme::Omid.with_prefix(body, include_prefix))
    }

    fn is_valid<'a>(&'a self, raw: &'a str) -> ValidityFuture<'a> {
        let valid = normalise(raw)
            .filter(|body| NONZERO_RE.is_match(body))
            .and_then(|body| self.data.lookup(&Scheme::Omid.with_prefix(body, true)))
            .unwrap_or(false);
        Box::pin(std::future::ready(valid))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::datasource::{DataSource, MemoryDataSource};
    use crate::record::ResolutionRecord;

    #[test]
    fn normalise_accepts_prefixed_and_iri_forms() {
        assert_eq!(normalise("omid:br/0601"), Some("br/0601".into()));
        assert_eq!(
            normalise("https://w3id.org/oc/meta/br/06101"),
            Some("br/06101".into())
        );
        assert_eq!(normalise("BR/12"), Some("br/12".into()));
        assert_eq!(normalise("ra/0601"), None);
        assert_eq!(normalise("br/06a"), None);
    }

    #[tokio::test]
    async fn validity_comes_from_data_map() {
        let data: Arc<dyn DataSource> = Arc::new(MemoryDataSource::new());
        data.set("omid:br/0601", ResolutionRecord::valid()).unwrap();
        data.set("omid:br/0602", ResolutionRecord::invalid()).unwrap();
        let m = OmidManager::new(ValidityMemo::new(&data));

        assert!(m.is_valid("omid:br/0601").await);
        assert!(!m.is_valid("omid:br/0602").await);
        // absent from the map
        assert!(!m.is_valid("omid:br/0603").await);
        assert!(!m.is_valid("omid:br/000").await);
    }
}
