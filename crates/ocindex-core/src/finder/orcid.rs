use std::sync::Arc;

use serde_json::Value;

use super::{FINDER_TOOL, FinderFuture, ResourceFinder, checked, record_from, require_body};
use crate::http::ApiClient;
use crate::identifier::{Scheme, orcid};
use crate::rate_limit::Remote;
use crate::record::{ResolutionRecord, Validity};

const SEARCH_URL: &str = "https://pub.orcid.org/v2.1/search?q=";

/// Author ORCIDs from the ORCID public search API.
///
/// ORCID only lists works its members claimed, so a result never settles
/// whether the identifier itself exists.
pub struct OrcidFinder {
    api: Arc<ApiClient>,
    scheme: Scheme,
    api_key: Option<String>,
}

impl OrcidFinder {
    /// Search works by DOI (`doi-self`).
    pub fn by_doi(api: Arc<ApiClient>, api_key: Option<String>) -> Self {
        Self {
            api,
            scheme: Scheme::Doi,
            api_key,
        }
    }

    /// Search works by PubMed identifier (`pmid-self`).
    pub fn by_pmid(api: Arc<ApiClient>, api_key: Option<String>) -> Self {
        Self {
            api,
            scheme: Scheme::Pmid,
            api_key,
        }
    }
}

/// The search expression for an identifier body.
pub fn search_query(scheme: Scheme, body: &str) -> String {
    match scheme {
        Scheme::Pmid => format!("pmid-self:\"{}\"", body),
        _ => format!(
            "doi-self:\"{}\" OR doi-self:\"{}\"",
            body,
            body.to_uppercase()
        ),
    }
}

impl ResourceFinder for OrcidFinder {
    fn name(&self) -> &str {
        "ORCID"
    }

    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn fetch<'a>(&'a self, id: &'a str) -> FinderFuture<'a> {
        Box::pin(async move {
            let body = require_body(self.scheme, id)?;
            let url = format!(
                "{}{}",
                SEARCH_URL,
                urlencoding::encode(&search_query(self.scheme, &body))
            );
            let bearer = self.api_key.as_ref().map(|key| format!("Bearer {}", key));
            let mut headers = vec![("Accept", "application/json")];
            if let Some(bearer) = bearer.as_deref() {
                headers.push(("Authorization", bearer));
            }

            let outcome = self.api.get_json(Remote::Orcid, FINDER_TOOL, &url, &headers).await;
            record_from(id, outcome, Validity::Unknown, extract)
        })
    }
}

/// ORCIDs from a search response (`result[].orcid-identifier.path`).
pub fn extract(json: &Value) -> ResolutionRecord {
    let paths = json["result"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|r| r["orcid-identifier"]["path"].as_str());
    ResolutionRecord {
        orcid: checked(paths, orcid::normalise, orcid::has_valid_check_digit).collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doi_query_covers_both_cases() {
        assert_eq!(
            search_query(Scheme::Doi, "10.1/abc"),
            r#"doi-self:"10.1/abc" OR doi-self:"10.1/ABC""#
        );
        assert_eq!(search_query(Scheme::Pmid, "29105"), r#"pmid-self:"29105""#);
    }

    #[test]
    fn extracts_result_paths() {
        let json = json!({
            "num-found": 2,
            "result": [
                {"orcid-identifier": {"path": "0000-0002-1825-0097"}},
                {"orcid-identifier": {"path": "0000-0002-1825-0098"}}
            ]
        });
        let rec = extract(&json);
        assert_eq!(rec.valid, Validity::Unknown);
        assert_eq!(rec.orcid.len(), 1);
    }

    #[test]
    fn null_result_is_empty() {
        let rec = extract(&json!({"num-found": 0, "result": null}));
        assert!(rec.orcid.is_empty());
    }
}
