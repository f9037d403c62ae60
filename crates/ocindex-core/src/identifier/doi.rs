use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    IdentifierManager, CHECK_TOOL, ValidityMemo, Scheme, ValidityFuture, memoised_check,
    decode_stable,
};
use crate::http::{ApiClient, quote_path};
use crate::rate_limit::Remote;

static DOI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^10\..+/.+$").unwrap());

/// Canonical DOI body: everything from the first `10.`, decoded and lower-cased.
pub fn normalise(raw: &str) -> Option<String> {
    let decoded = decode_stable(raw);
    let start = decoded.find("10.")?;
    let body = decoded[start..].to_lowercase();
    DOI_RE.is_match(&body).then_some(body)
}

/// DOIs are checked against the DOI handle API.
pub struct DoiManager {
    api: Option<Arc<ApiClient>>,
    memo: ValidityMemo,
}

impl DoiManager {
    pub fn new(api: Option<Arc<ApiClient>>, memo: ValidityMemo) -> Self {
        Self { api, memo }
    }

    /// Offline manager: only memoised decisions can make a DOI valid.
    pub fn offline() -> Self {
        Self::new(None, ValidityMemo::none())
    }
}

impl IdentifierManager for DoiManager {
    fn scheme(&self) -> Scheme {
        Scheme::Doi
    }

    fn normalise(&self, raw: &str, include_prefix: bool) -> Option<String> {
        normalise(raw).map(|body| Scheme::Doi.with_prefix(body, include_prefix))
    }

    fn is_valid<'a>(&'a self, raw: &'a str) -> ValidityFuture<'a> {
        Box::pin(async move {
            let Some(body) = normalise(raw) else {
                return false;
            };
            let prefixed = Scheme::Doi.with_prefix(body.clone(), true);
            let check = self.api.as_ref().map(|api| async move {
                let url = format!("https://doi.org/api/handles/{}", quote_path(&body));
                api.get_json(Remote::DoiOrg, CHECK_TOOL, &url, &[])
                    .await
                    .map(|json| json["responseCode"].as_i64() == Some(1))
            });
            memoised_check(&self.memo, &prefixed, check).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{DataSource, MemoryDataSource};
    use crate::record::ResolutionRecord;

    #[test]
    fn strips_resolver_url() {
        assert_eq!(
            normalise("https://doi.org/10.1108/JD-12-2013-0166"),
            Some("10.1108/jd-12-2013-0166".into())
        );
    }

    #[test]
    fn prefix_is_optional() {
        let m = DoiManager::offline();
        assert_eq!(
            m.normalise("https://doi.org/10.1108/JD-12-2013-0166", true),
            Some("doi:10.1108/jd-12-2013-0166".into())
        );
        assert_eq!(
            m.normalise("doi:10.1108/jd-12-2013-0166", false),
            Some("10.1108/jd-12-2013-0166".into())
        );
    }

    #[test]
    fn decodes_and_removes_whitespace() {
        assert_eq!(
            normalise("10.1002/%28SICI%291097 -4571\0"),
            Some("10.1002/(sici)1097-4571".into())
        );
    }

    #[test]
    fn rejects_non_dois() {
        assert_eq!(normalise("bad"), None);
        assert_eq!(normalise("10.1234"), None);
        assert_eq!(normalise("10./x"), None);
        assert_eq!(normalise(""), None);
    }

    #[tokio::test]
    async fn offline_manager_rejects_unknown() {
        assert!(!DoiManager::offline().is_valid("10.1/a").await);
    }

    #[tokio::test]
    async fn memoised_positive_is_trusted() {
        let cache: Arc<dyn DataSource> = Arc::new(MemoryDataSource::new());
        cache.set("doi:10.1/a", ResolutionRecord::valid()).unwrap();
        let m = DoiManager::new(None, ValidityMemo::new(&cache));
        assert!(m.is_valid("https://doi.org/10.1/A").await);
        assert!(!m.is_valid("10.1/b").await);
        assert!(!m.is_valid("garbage").await);
    }
}
