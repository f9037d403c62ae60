use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::{IdentifierManager, CHECK_TOOL, ValidityMemo, Scheme, ValidityFuture, memoised_check};
use crate::http::ApiClient;
use crate::rate_limit::Remote;

static PMID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9][0-9]*$").unwrap());

/// Digits only, without leading zeros.
pub fn normalise(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let body = digits.trim_start_matches('0');
    PMID_RE.is_match(body).then(|| body.to_string())
}

/// Whether a PubMed page carries `<meta name="uid" content="{pmid}">`.
pub fn page_has_uid(html: &str, pmid: &str) -> bool {
    let Ok(selector) = Selector::parse(r#"meta[name="uid"]"#) else {
        return false;
    };
    Html::parse_document(html)
        .select(&selector)
        .any(|meta| meta.value().attr("content") == Some(pmid))
}

/// PubMed identifiers are confirmed against the PubMed web page.
pub struct PmidManager {
    api: Option<Arc<ApiClient>>,
    memo: ValidityMemo,
}

impl PmidManager {
    pub fn new(api: Option<Arc<ApiClient>>, memo: ValidityMemo) -> Self {
        Self { api, memo }
    }
}

impl IdentifierManager for PmidManager {
    fn scheme(&self) -> Scheme {
        Scheme::Pmid
    }

    fn normalise(&self, raw: &str, include_prefix: bool) -> Option<String> {
        normalise(raw).map(|body| Scheme::Pmid.with_prefix(body, include_prefix))
    }

    fn is_valid<'a>(&'a self, raw: &'a str) -> ValidityFuture<'a> {
        Box::pin(async move {
            let Some(pmid) = normalise(raw) else {
                return false;
            };
            let prefixed = Scheme::Pmid.with_prefix(pmid.clone(), true);
            let check = self.api.as_ref().map(|api| async move {
                let url = format!("https://pubmed.ncbi.nlm.nih.gov/{}/?format=pmid", pmid);
                api.get_text(Remote::PubMed, CHECK_TOOL, &url, &[])
                    .await
                    .map(|html| page_has_uid(&html, &pmid))
            });
            memoised_check(&self.memo, &prefixed, check).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_zeros_and_noise() {
        assert_eq!(normalise("PMID: 0029105"), Some("29105".into()));
        assert_eq!(normalise("pmid:29105"), Some("29105".into()));
        assert_eq!(normalise("000"), None);
        assert_eq!(normalise("abc"), None);
    }

    #[test]
    fn uid_meta_must_match() {
        let page = r#"<html><head><meta name="uid" content="29105"></head><body></body></html>"#;
        assert!(page_has_uid(page, "29105"));
        assert!(!page_has_uid(page, "29106"));
        assert!(!page_has_uid("<html></html>", "29105"));
    }

    #[tokio::test]
    async fn offline_check_is_negative() {
        let m = PmidManager::new(None, ValidityMemo::none());
        assert!(!m.is_valid("29105").await);
        assert_eq!(m.normalise("0029105", true), Some("pmid:29105".into()));
    }
}
