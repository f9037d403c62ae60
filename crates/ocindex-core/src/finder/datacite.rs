use std::sync::Arc;

use serde_json::Value;

use super::{FINDER_TOOL, FinderFuture, ResourceFinder, checked, record_from, require_body};
use crate::check_date;
use crate::http::{ApiClient, quote_path};
use crate::identifier::{Scheme, issn, orcid};
use crate::rate_limit::Remote;
use crate::record::{ResolutionRecord, Validity};

/// DOI metadata from the DataCite REST API.
pub struct DataCiteFinder {
    api: Arc<ApiClient>,
}

impl DataCiteFinder {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

impl ResourceFinder for DataCiteFinder {
    fn name(&self) -> &str {
        "DataCite"
    }

    fn scheme(&self) -> Scheme {
        Scheme::Doi
    }

    fn fetch<'a>(&'a self, id: &'a str) -> FinderFuture<'a> {
        Box::pin(async move {
            let doi = require_body(Scheme::Doi, id)?;
            let url = format!("https://api.datacite.org/dois/{}", quote_path(&doi));
            let outcome = self.api.get_json(Remote::DataCite, FINDER_TOOL, &url, &[]).await;
            record_from(id, outcome, Validity::Valid, |json| {
                extract(&json["data"]["attributes"])
            })
        })
    }
}

/// Facts from a DataCite `data.attributes` object.
pub fn extract(attributes: &Value) -> ResolutionRecord {
    let mut record = ResolutionRecord::default();

    if let Some(date) = issued_date(attributes) {
        record.date.insert(date);
    }

    let is_journal = attributes["types"]["citeproc"]
        .as_str()
        .is_some_and(|t| t.contains("journal"));
    if is_journal {
        let container = &attributes["container"];
        let from_container = (container["identifierType"].as_str() == Some("ISSN"))
            .then(|| container["identifier"].as_str())
            .flatten();
        let from_related = attributes["relatedIdentifiers"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|rel| {
                rel["relationType"].as_str() == Some("IsPartOf")
                    && rel["relatedIdentifierType"].as_str() == Some("ISSN")
            })
            .filter_map(|rel| rel["relatedIdentifier"].as_str());
        record.issn.extend(checked(
            from_container.into_iter().chain(from_related),
            issn::normalise,
            issn::has_valid_check_digit,
        ));
    }

    let orcids = attributes["creators"]
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|creator| creator["nameIdentifiers"].as_array().into_iter().flatten())
        .filter(|ni| {
            ni["nameIdentifierScheme"]
                .as_str()
                .is_some_and(|s| s.eq_ignore_ascii_case("orcid"))
        })
        .filter_map(|ni| ni["nameIdentifier"].as_str());
    record
        .orcid
        .extend(checked(orcids, orcid::normalise, orcid::has_valid_check_digit));

    record
}

/// The `Issued` entry of `dates`, else `publicationYear`.
fn issued_date(attributes: &Value) -> Option<String> {
    let issued = attributes["dates"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|d| d["dateType"].as_str() == Some("Issued"))
        .and_then(|d| d["date"].as_str())
        .and_then(check_date);
    issued.or_else(|| match &attributes["publicationYear"] {
        Value::Number(n) => check_date(&n.to_string()),
        Value::String(s) => check_date(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn issued_date_wins_over_publication_year() {
        let attrs = json!({
            "dates": [
                {"date": "2012-01-01", "dateType": "Created"},
                {"date": "2013-05-07", "dateType": "Issued"}
            ],
            "publicationYear": 2011
        });
        assert_eq!(extract(&attrs).first_date(), Some("2013-05-07"));
        assert_eq!(
            extract(&json!({"publicationYear": 2011})).first_date(),
            Some("2011")
        );
        assert_eq!(
            extract(&json!({"publicationYear": "2011"})).first_date(),
            Some("2011")
        );
    }

    #[test]
    fn journal_issns_from_container_and_relations() {
        let attrs = json!({
            "types": {"citeproc": "article-journal"},
            "container": {"identifierType": "ISSN", "identifier": "0317-8471"},
            "relatedIdentifiers": [
                {"relationType": "IsPartOf", "relatedIdentifierType": "ISSN", "relatedIdentifier": "2049-3630"},
                {"relationType": "References", "relatedIdentifierType": "ISSN", "relatedIdentifier": "1050-124X"}
            ]
        });
        let rec = extract(&attrs);
        assert_eq!(rec.issn.len(), 2);
        assert!(rec.issn.contains("2049-3630"));
    }

    #[test]
    fn datasets_carry_no_issn() {
        let attrs = json!({
            "types": {"citeproc": "dataset"},
            "container": {"identifierType": "ISSN", "identifier": "0317-8471"}
        });
        assert!(extract(&attrs).issn.is_empty());
    }

    #[test]
    fn creator_orcids() {
        let attrs = json!({
            "creators": [{
                "name": "Carberry, Josiah",
                "nameIdentifiers": [
                    {"nameIdentifier": "https://orcid.org/0000-0002-1825-0097", "nameIdentifierScheme": "ORCID"},
                    {"nameIdentifier": "123", "nameIdentifierScheme": "ISNI"}
                ]
            }]
        });
        let rec = extract(&attrs);
        assert_eq!(rec.orcid.len(), 1);
        assert!(rec.orcid.contains("0000-0002-1825-0097"));
    }
}
