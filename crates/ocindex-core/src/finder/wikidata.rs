use std::sync::Arc;

use serde_json::Value;

use super::{FINDER_TOOL, FinderFuture, ResourceFinder, checked, record_from, require_body};
use crate::http::ApiClient;
use crate::identifier::{Scheme, issn, orcid};
use crate::rate_limit::Remote;
use crate::record::{ResolutionRecord, Validity};

const SPARQL_URL: &str = "https://query.wikidata.org/sparql";

/// Publication year, venue ISSNs and author ORCIDs from the Wikidata query
/// service.
///
/// Wikidata covers a fraction of the literature, so an empty answer says
/// nothing about whether the identifier exists.
pub struct WikidataFinder {
    api: Arc<ApiClient>,
    scheme: Scheme,
}

impl WikidataFinder {
    /// Look items up by QID.
    pub fn by_qid(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            scheme: Scheme::Wikidata,
        }
    }

    /// Look items up through their DOI statement (P356).
    pub fn by_doi(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            scheme: Scheme::Doi,
        }
    }
}

/// SPARQL selecting the item for `body` with its publication date (P577),
/// the ISSNs (P236) of the venue it was published in (P1433) and the ORCIDs
/// (P496) of its authors (P50).
///
/// Wikidata stores DOIs upper-cased.
pub fn sparql_query(scheme: Scheme, body: &str) -> String {
    let item = match scheme {
        Scheme::Doi => format!(
            "?item wdt:P356 \"{}\" .",
            body.to_uppercase().replace('\\', "\\\\").replace('"', "\\\"")
        ),
        _ => format!("VALUES ?item {{ wd:{} }}", body),
    };
    format!(
        "SELECT ?item ?date ?issn ?orcid WHERE {{ {} \
         OPTIONAL {{ ?item wdt:P577 ?date . }} \
         OPTIONAL {{ ?item wdt:P1433 ?venue . ?venue wdt:P236 ?issn . }} \
         OPTIONAL {{ ?item wdt:P50 ?author . ?author wdt:P496 ?orcid . }} }}",
        item
    )
}

impl ResourceFinder for WikidataFinder {
    fn name(&self) -> &str {
        "Wikidata"
    }

    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn fetch<'a>(&'a self, id: &'a str) -> FinderFuture<'a> {
        Box::pin(async move {
            let body = require_body(self.scheme, id)?;
            let url = format!(
                "{}?format=json&query={}",
                SPARQL_URL,
                urlencoding::encode(&sparql_query(self.scheme, &body))
            );
            let headers = [("Accept", "application/sparql-results+json")];
            let outcome = self
                .api
                .get_json(Remote::Wikidata, FINDER_TOOL, &url, &headers)
                .await;
            record_from(id, outcome, Validity::Unknown, extract)
        })
    }
}

/// Values of `variable` across all result rows.
fn bound<'a>(json: &'a Value, variable: &'a str) -> impl Iterator<Item = &'a str> {
    json["results"]["bindings"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(move |row| row[variable]["value"].as_str())
}

/// Facts from a SPARQL JSON result. Dates keep the year only: the query
/// service pads every date to a full timestamp whatever its precision.
pub fn extract(json: &Value) -> ResolutionRecord {
    let date = bound(json, "date")
        .filter_map(|d| d.get(..4))
        .filter(|y| y.bytes().all(|b| b.is_ascii_digit()))
        .min()
        .map(str::to_string);
    ResolutionRecord {
        date: date.into_iter().collect(),
        issn: checked(bound(json, "issn"), issn::normalise, issn::has_valid_check_digit).collect(),
        orcid: checked(bound(json, "orcid"), orcid::normalise, orcid::has_valid_check_digit)
            .collect(),
        ..Default::default()
    }
}
