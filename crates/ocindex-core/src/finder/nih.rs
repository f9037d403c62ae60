use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::{FINDER_TOOL, FinderFuture, ResourceFinder, checked, record_from, require_body};
use crate::http::ApiClient;
use crate::identifier::{Scheme, issn, orcid};
use crate::rate_limit::Remote;
use crate::record::{ResolutionRecord, Validity};

static ISSN_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^IS  - ([0-9]{4}-[0-9]{3}[0-9X])").unwrap());

static DATE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^DP\s+-\s+(\d{4})(?:\s+(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec))?(?:\s+(\d{1,2}))?",
    )
    .unwrap()
});

static ORCID_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^AUID-\s*ORCID:\s*(\S+)").unwrap());

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// PMID metadata from the MEDLINE-format PubMed page.
pub struct NihFinder {
    api: Arc<ApiClient>,
}

impl NihFinder {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

impl ResourceFinder for NihFinder {
    fn name(&self) -> &str {
        "PubMed"
    }

    fn scheme(&self) -> Scheme {
        Scheme::Pmid
    }

    fn fetch<'a>(&'a self, id: &'a str) -> FinderFuture<'a> {
        Box::pin(async move {
            let pmid = require_body(Scheme::Pmid, id)?;
            let url = format!("https://pubmed.ncbi.nlm.nih.gov/{}/?format=pubmed", pmid);
            let outcome = self.api.get_text(Remote::PubMed, FINDER_TOOL, &url, &[]).await;
            record_from(id, outcome, Validity::Valid, |page| {
                extract(&medline_text(page))
            })
        })
    }
}

/// The MEDLINE block of a PubMed page (`#article-details`), or the whole body.
pub fn medline_text(page: &str) -> String {
    let Ok(selector) = Selector::parse("#article-details") else {
        return page.to_string();
    };
    Html::parse_document(page)
        .select(&selector)
        .next()
        .map(|pre| pre.text().collect())
        .unwrap_or_else(|| page.to_string())
}

/// Facts from MEDLINE text.
pub fn extract(text: &str) -> ResolutionRecord {
    let mut record = ResolutionRecord::default();

    if let Some(date) = publication_date(text) {
        record.date.insert(date);
    }

    let issns = ISSN_LINE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()));
    record
        .issn
        .extend(checked(issns, issn::normalise, issn::has_valid_check_digit));

    let orcids = ORCID_LINE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()));
    record
        .orcid
        .extend(checked(orcids, orcid::normalise, orcid::has_valid_check_digit));

    record
}

/// The `DP` line as `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, rendered as written.
fn publication_date(text: &str) -> Option<String> {
    let caps = DATE_LINE.captures(text)?;
    let year = caps.get(1)?.as_str();
    let month = caps
        .get(2)
        .and_then(|m| MONTHS.iter().position(|name| *name == m.as_str()))
        .map(|i| i + 1);
    let day = caps.get(3).and_then(|d| d.as_str().parse::<u32>().ok());

    Some(match (month, day) {
        (Some(m), Some(d)) => format!("{year}-{m:02}-{d:02}"),
        (Some(m), None) => format!("{year}-{m:02}"),
        _ => year.to_string(),
    })
}
