use ocindex_core::CitationData;
use serde_json::Value;

use super::{CitationParser, Citations, ParserKind, Rows, doi, read_json};
use crate::IngestError;

/// Crossref JSON dump files: `{"items": [{"DOI": ..., "reference": [...]}]}`.
///
/// Emits one list per work: every reference whose DOI normalises.
#[derive(Debug, Default)]
pub struct CrossrefParser {
    rows: Rows<Value>,
}

fn citations_of(item: &Value) -> Option<Vec<CitationData>> {
    let citing = doi(item["DOI"].as_str())?;
    let cited: Vec<CitationData> = item["reference"]
        .as_array()?
        .iter()
        .filter_map(|r| doi(r["DOI"].as_str()))
        .map(|cited| CitationData::new(citing.clone(), cited))
        .collect();
    (!cited.is_empty()).then_some(cited)
}

impl CitationParser for CrossrefParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Crossref
    }

    fn parse_bytes(&mut self, bytes: &[u8]) -> Result<(), IngestError> {
        let mut json = read_json(bytes)?;
        let items = match json.get_mut("items").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        self.rows.reset(items);
        Ok(())
    }

    fn next_citation_data(&mut self) -> Option<Citations> {
        while let Some(item) = self.rows.next_row() {
            if let Some(list) = citations_of(item) {
                return Some(Citations::Many(list));
            }
        }
        None
    }

    fn items(&self) -> usize {
        self.rows.len()
    }

    fn current_item(&self) -> usize {
        self.rows.consumed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_tuple_per_valid_reference() {
        let mut parser = CrossrefParser::default();
        parser
            .parse_bytes(
                br#"{"items":[{"DOI":"10.1/A","reference":[{"DOI":"10.2/B"},{"DOI":"bad"}]}]}"#,
            )
            .unwrap();
        assert_eq!(parser.items(), 1);
        assert_eq!(
            parser.next_citation_data(),
            Some(Citations::Many(vec![CitationData::new("10.1/a", "10.2/b")]))
        );
        assert_eq!(parser.next_citation_data(), None);
        assert_eq!(parser.current_item(), 1);
    }

    #[test]
    fn items_without_usable_references_are_skipped() {
        let mut parser = CrossrefParser::default();
        parser
            .parse_bytes(
                br#"{"items":[
                    {"DOI":"10.1/a"},
                    {"DOI":"nope","reference":[{"DOI":"10.2/b"}]},
                    {"DOI":"10.1/c","reference":[{"key":"ref1","unstructured":"x"}]},
                    {"DOI":"10.1/d","reference":[{"DOI":"10.2/e"}]}
                ]}"#,
            )
            .unwrap();
        let first = parser.next_citation_data().unwrap();
        assert_eq!(first, Citations::Many(vec![CitationData::new("10.1/d", "10.2/e")]));
        assert_eq!(parser.current_item(), 4);
        assert!(parser.next_citation_data().is_none());
    }

    #[test]
    fn missing_items_means_no_rows() {
        let mut parser = CrossrefParser::default();
        parser.parse_bytes(br#"{"status":"ok"}"#).unwrap();
        assert_eq!(parser.items(), 0);
        assert!(parser.collect_all().is_empty());
    }

    #[test]
    fn parse_resets_counters() {
        let mut parser = CrossrefParser::default();
        let body = br#"{"items":[{"DOI":"10.1/a","reference":[{"DOI":"10.2/b"}]}]}"#;
        parser.parse_bytes(body).unwrap();
        assert_eq!(parser.collect_all().len(), 1);
        parser.parse_bytes(body).unwrap();
        assert_eq!(parser.current_item(), 0);
        assert_eq!(parser.collect_all().len(), 1);
    }
}
