use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    IdentifierManager, CHECK_TOOL, ValidityMemo, Scheme, ValidityFuture, memoised_check,
    decode_stable,
};
use crate::http::ApiClient;
use crate::rate_limit::Remote;

static QID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Q[1-9][0-9]*$").unwrap());

/// Upper-cased, from the first `Q` onwards.
pub fn normalise(raw: &str) -> Option<String> {
    let upper = decode_stable(raw).to_uppercase();
    let start = upper.find('Q')?;
    let body = upper[start..].to_string();
    (!body.is_empty()).then_some(body)
}

/// Wikidata items, checked against the entity data endpoint.
pub struct WikidataManager {
    api: Option<Arc<ApiClient>>,
    memo: ValidityMemo,
}

impl WikidataManager {
    pub fn new(api: Option<Arc<ApiClient>>, memo: ValidityMemo) -> Self {
        Self { api, memo }
    }
}

impl IdentifierManager for WikidataManager {
    fn scheme(&self) -> Scheme {
        Scheme::Wikidata
    }

    fn normalise(&self, raw: &str, include_prefix: bool) -> Option<String> {
        normalise(raw).map(|body| Scheme::Wikidata.with_prefix(body, include_prefix))
    }

    fn is_valid<'a>(&'a self, raw: &'a str) -> ValidityFuture<'a> {
        Box::pin(async move {
            let Some(qid) = normalise(raw).filter(|q| QID_RE.is_match(q)) else {
                return false;
            };
            let prefixed = Scheme::Wikidata.with_prefix(qid.clone(), true);
            let check = self.api.as_ref().map(|api| async move {
                let url = format!("https://www.wikidata.org/wiki/Special:EntityData/{}.json", qid);
                api.get_json(Remote::Wikidata, CHECK_TOOL, &url, &[])
                    .await
                    .map(|json| {
                        json["entities"]
                            .as_object()
                            .is_some_and(|entities| !entities.is_empty())
                    })
            });
            memoised_check(&self.memo, &prefixed, check).await
        })
    }
}
