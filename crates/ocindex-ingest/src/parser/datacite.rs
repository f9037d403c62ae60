use ocindex_core::CitationData;
use serde::Deserialize;
use serde_json::Value;

use super::{CitationParser, Citations, ParserKind, Rows, doi, read_csv_rows, read_json};
use crate::IngestError;

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    citing: Option<String>,
    #[serde(default)]
    referenced: Option<String>,
}

/// DataCite citation CSV with `citing` and `referenced` DOI columns.
#[derive(Debug, Default)]
pub struct DataCiteParser {
    rows: Rows<Row>,
}

impl CitationParser for DataCiteParser {
    fn kind(&self) -> ParserKind {
        ParserKind::DataCite
    }

    fn parse_bytes(&mut self, bytes: &[u8]) -> Result<(), IngestError> {
        self.rows.reset(read_csv_rows(bytes)?);
        Ok(())
    }

    fn next_citation_data(&mut self) -> Option<Citations> {
        while let Some(row) = self.rows.next_row() {
            let citing = doi(row.citing.as_deref());
            let cited = doi(row.referenced.as_deref());
            if let (Some(citing), Some(cited)) = (citing, cited) {
                return Some(Citations::One(CitationData::new(citing, cited)));
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

/// Relation types that make the record the citing side.
const CITING_RELATIONS: [&str; 2] = ["references", "cites"];

/// DataCite REST dump pages: `{"data": [{"attributes": {"doi", "relatedIdentifiers"}}]}`.
///
/// Emits one list per record, from its DOI-typed `References`/`Cites` relations.
#[derive(Debug, Default)]
pub struct DataCiteJsonParser {
    rows: Rows<Value>,
}

fn citations_of(record: &Value) -> Option<Vec<CitationData>> {
    let attributes = &record["attributes"];
    let citing = doi(attributes["doi"].as_str())?;
    let cited: Vec<CitationData> = attributes["relatedIdentifiers"]
        .as_array()?
        .iter()
        .filter(|rel| {
            rel["relatedIdentifierType"]
                .as_str()
                .is_some_and(|t| t.eq_ignore_ascii_case("doi"))
                && rel["relationType"]
                    .as_str()
                    .is_some_and(|t| CITING_RELATIONS.contains(&t.to_lowercase().as_str()))
        })
        .filter_map(|rel| doi(rel["relatedIdentifier"].as_str()))
        .map(|cited| CitationData::new(citing.clone(), cited))
        .collect();
    (!cited.is_empty()).then_some(cited)
}

impl CitationParser for DataCiteJsonParser {
    fn kind(&self) -> ParserKind {
        ParserKind::DataCiteJson
    }

    fn parse_bytes(&mut self, bytes: &[u8]) -> Result<(), IngestError> {
        let mut json = read_json(bytes)?;
        let data = match json.get_mut("data").map(Value::take) {
            Some(Value::Array(data)) => data,
            _ => Vec::new(),
        };
        self.rows.reset(data);
        Ok(())
    }

    fn next_citation_data(&mut self) -> Option<Citations> {
        while let Some(record) = self.rows.next_row() {
            if let Some(list) = citations_of(record) {
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
