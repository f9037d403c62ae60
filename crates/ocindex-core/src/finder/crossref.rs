use std::sync::Arc;

use serde_json::Value;

use super::{FINDER_TOOL, FinderFuture, ResourceFinder, checked, record_from, require_body};
use crate::http::{ApiClient, quote_path};
use crate::identifier::{Scheme, issn, orcid};
use crate::rate_limit::Remote;
use crate::record::{ResolutionRecord, Validity};
use crate::render_date;

/// DOI metadata from the Crossref REST API.
pub struct CrossrefFinder {
    api: Arc<ApiClient>,
}

impl CrossrefFinder {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

impl ResourceFinder for CrossrefFinder {
    fn name(&self) -> &str {
        "Crossref"
    }

    fn scheme(&self) -> Scheme {
        Scheme::Doi
    }

    fn fetch<'a>(&'a self, id: &'a str) -> FinderFuture<'a> {
        Box::pin(async move {
            let doi = require_body(Scheme::Doi, id)?;
            let url = format!("https://api.crossref.org/works/{}", quote_path(&doi));
            let outcome = self.api.get_json(Remote::Crossref, FINDER_TOOL, &url, &[]).await;
            record_from(id, outcome, Validity::Valid, |json| {
                extract(&json["message"])
            })
        })
    }
}

/// Facts from a Crossref `message` object.
pub fn extract(message: &Value) -> ResolutionRecord {
    let mut record = ResolutionRecord::default();

    if let Some(date) = issued_date(message) {
        record.date.insert(date);
    }

    let is_journal = message["type"]
        .as_str()
        .is_some_and(|t| t.contains("journal"));
    if is_journal {
        let issns = message["ISSN"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str);
        record
            .issn
            .extend(checked(issns, issn::normalise, issn::has_valid_check_digit));
    }

    let orcids = message["author"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|author| author["ORCID"].as_str());
    record
        .orcid
        .extend(checked(orcids, orcid::normalise, orcid::has_valid_check_digit));

    record
}

/// `issued.date-parts[0]` rendered as an ISO date fragment.
fn issued_date(message: &Value) -> Option<String> {
    let parts = message["issued"]["date-parts"].get(0)?.as_array()?;
    let year = parts.first()?.as_i64()?;
    let month = parts.get(1).and_then(Value::as_i64);
    let day = parts.get(2).and_then(Value::as_i64);
    render_date(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn journal_article() {
        let msg = json!({
            "type": "journal-article",
            "issued": {"date-parts": [[2015, 3, 12]]},
            "ISSN": ["0317-8471", "1234-5678"],
            "author": [
                {"given": "A", "ORCID": "http://orcid.org/0000-0002-1825-0097"},
                {"given": "B"}
            ]
        });
        let rec = extract(&msg);
        assert_eq!(rec.first_date(), Some("2015-03-12"));
        // the second ISSN fails its check digit
        assert_eq!(rec.issn.len(), 1);
        assert!(rec.issn.contains("0317-8471"));
        assert!(rec.orcid.contains("0000-0002-1825-0097"));
    }

    #[test]
    fn non_journal_types_carry_no_issn() {
        let msg = json!({
            "type": "book-chapter",
            "issued": {"date-parts": [[2015, 1, 1]]},
            "ISSN": ["0317-8471"]
        });
        let rec = extract(&msg);
        assert_eq!(rec.first_date(), Some("2015"));
        assert!(rec.issn.is_empty());
    }

    #[test]
    fn missing_or_null_dates() {
        assert!(extract(&json!({})).date.is_empty());
        assert!(extract(&json!({"issued": {"date-parts": [[null]]}})).date.is_empty());
        assert_eq!(
            extract(&json!({"issued": {"date-parts": [[1999, 7]]}})).first_date(),
            Some("1999-07")
        );
    }
}
