use once_cell::sync::Lazy;
use regex::Regex;

static CITATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<https://w3id\.org/oc/index/ci/([0-9A-Za-z]+)-([0-9A-Za-z]+)>").unwrap()
});

static SOURCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<https://w3id\.org/oc/index/([A-Za-z]+)/>").unwrap());

/// The citation a triple line talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CitationLine<'a> {
    pub citing: &'a str,
    pub cited: &'a str,
    /// Set on provenance (`prov:atLocation`) lines.
    pub source: Option<&'a str>,
}

impl CitationLine<'_> {
    /// The citation identifier, `{citing}-{cited}`.
    pub fn citation_id(&self) -> String {
        format!("{}-{}", self.citing, self.cited)
    }
}

/// Extract the citation subject (and source, if any) from one line.
pub fn parse_line(line: &str) -> Option<CitationLine<'_>> {
    let caps = CITATION_RE.captures(line)?;
    let citing = caps.get(1)?.as_str();
    let cited = caps.get(2)?.as_str();
    let source = SOURCE_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());
    Some(CitationLine {
        citing,
        cited,
        source,
    })
}

/// Split a `{citing}-{cited}` citation identifier.
pub fn split_citation_id(id: &str) -> Option<(&str, &str)> {
    let (citing, cited) = id.trim().split_once('-')?;
    (!citing.is_empty() && !cited.is_empty()).then_some((citing, cited))
}
