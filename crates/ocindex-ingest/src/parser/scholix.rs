use ocindex_core::CitationData;
use serde_json::Value;

use super::{CitationParser, Citations, ParserKind, Rows, date, doi, read_json};
use crate::IngestError;

/// Scholix link packages: a top-level array of `{"Source": {...}, "Target": {...}}`.
#[derive(Debug, Default)]
pub struct ScholixParser {
    rows: Rows<Value>,
}

fn citation_of(link: &Value) -> Option<CitationData> {
    let source = link.get("Source")?;
    let target = link.get("Target")?;
    let citing = doi(source["ID"].as_str())?;
    let cited = doi(target["ID"].as_str())?;
    Some(CitationData::new(citing, cited).with_dates(
        date(source["PublicationDate"].as_str()),
        date(target["PublicationDate"].as_str()),
    ))
}

impl CitationParser for ScholixParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Scholix
    }

    fn parse_bytes(&mut self, bytes: &[u8]) -> Result<(), IngestError> {
        let links = match read_json(bytes)? {
            Value::Array(links) => links,
            _ => {
                return Err(IngestError::MalformedInputFile {
                    path: Default::default(),
                    reason: "expected a top-level array of links".into(),
                });
            }
        };
        self.rows.reset(links);
        Ok(())
    }

    fn next_citation_data(&mut self) -> Option<Citations> {
        while let Some(link) = self.rows.next_row() {
            if let Some(c) = citation_of(link) {
                return Some(Citations::One(c));
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
    fn source_and_target_ids() {
        let mut parser = ScholixParser::default();
        parser
            .parse_bytes(
                br#"[
                    {"Source": {"ID": "10.1/A", "PublicationDate": "2019-01-02T00:00:00"},
                     "Target": {"ID": "10.2/B", "PublicationDate": ""}},
                    {"Source": {"ID": "10.1/A"}},
                    {"Source": {"ID": "10.1/C"}, "Target": {"ID": "not-a-doi"}},
                    {"Source": {"ID": "10.1/D"}, "Target": {"ID": "10.2/E", "PublicationDate": "2001"}}
                ]"#,
            )
            .unwrap();
        assert_eq!(parser.items(), 4);
        assert_eq!(
            parser.collect_all(),
            vec![
                CitationData::new("10.1/a", "10.2/b").with_dates(Some("2019-01-02".into()), None),
                CitationData::new("10.1/d", "10.2/e").with_dates(None, Some("2001".into())),
            ]
        );
    }

    #[test]
    fn non_array_content_is_malformed() {
        let mut parser = ScholixParser::default();
        assert!(matches!(
            parser.parse_bytes(br#"{"Source": {}}"#),
            Err(IngestError::MalformedInputFile { .. })
        ));
    }
}
