use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    IdentifierManager, CHECK_TOOL, ValidityMemo, Scheme, ValidityFuture, memoised_check,
    decode_stable,
};
use crate::http::{ApiClient, quote_path};
use crate::rate_limit::Remote;

static META_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]{2}/[0-9]+$").unwrap());

/// Keep the two-letter entity type before the last `/` and everything after.
pub fn normalise(raw: &str) -> Option<String> {
    let decoded = decode_stable(raw);
    let slash = decoded.rfind('/')?;
    let start = slash.checked_sub(2)?;
    let body = decoded.get(start..)?.to_lowercase();
    (!body.is_empty()).then_some(body)
}

/// OpenCitations Meta identifiers (`br/0601...`), checked on the Meta web path.
pub struct MetaIdManager {
    api: Option<Arc<ApiClient>>,
    memo: ValidityMemo,
}

impl MetaIdManager {
    pub fn new(api: Option<Arc<ApiClient>>, memo: ValidityMemo) -> Self {
        Self { api, memo }
    }
}

impl IdentifierManager for MetaIdManager {
    fn scheme(&self) -> Scheme {
        Scheme::Meta
    }

    fn normalise(&self, raw: &str, include_prefix: bool) -> Option<String> {
        normalise(raw).map(|body| Scheme::Meta.with_prefix(body, include_prefix))
    }

    fn is_valid<'a>(&'a self, raw: &'a str) -> ValidityFuture<'a> {
        Box::pin(async move {
            let Some(body) = normalise(raw).filter(|b| META_RE.is_match(b)) else {
                return false;
            };
            let prefixed = Scheme::Meta.with_prefix(body.clone(), true);
            let check = self.api.as_ref().map(|api| async move {
                let url = format!("https://w3id.org/oc/meta/{}", quote_path(&body));
                api.get_text(Remote::OcMeta, CHECK_TOOL, &url, &[("Accept", "application/json")])
                    .await
                    .map(|_| true)
            });
            memoised_check(&self.memo, &prefixed, check).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_entity_type() {
        assert_eq!(
            normalise("https://w3id.org/oc/meta/br/0601"),
            Some("br/0601".into())
        );
        assert_eq!(normalise("meta:BR/0601 "), Some("br/0601".into()));
    }

    #[test]
    fn url_inputs_keep_the_segment_before_the_last_slash() {
        // w3id IRIs carry several slashes before the entity type
        assert_eq!(normalise("https://w3id.org/oc/meta/ra/0610"), Some("ra/0610".into()));
        assert_eq!(normalise("omid:br/0601"), Some("br/0601".into()));
        assert_eq!(normalise("https%3A%2F%2Fw3id.org%2Foc%2Fmeta%2Fbr%2F06"), Some("br/06".into()));
        let once = normalise("https://w3id.org/oc/meta/br/0601").unwrap();
        assert_eq!(normalise(&once), Some(once.clone()));
    }

    #[test]
    fn needs_two_characters_before_slash() {
        assert_eq!(normalise("/0601"), None);
        assert_eq!(normalise("b/0601"), None);
        assert_eq!(normalise("0601"), None);
    }

    #[tokio::test]
    async fn malformed_bodies_are_invalid() {
        let m = MetaIdManager::new(None, ValidityMemo::none());
        assert!(!m.is_valid("meta:b1/x").await);
    }
}
