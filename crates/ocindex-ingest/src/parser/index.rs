use ocindex_core::identifier::normalise;
use ocindex_core::{CitationData, Scheme};
use serde::Deserialize;

use super::{CitationParser, Citations, ParserKind, Rows, read_csv_rows};
use crate::IngestError;

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    citing: Option<String>,
    #[serde(default)]
    cited: Option<String>,
}

/// OpenCitations Index CSV: `citing`/`cited` OMIDs, emitted with their prefix.
#[derive(Debug, Default)]
pub struct IndexParser {
    rows: Rows<Row>,
}

fn omid(raw: Option<&str>) -> Option<String> {
    normalise(Scheme::Omid, raw?, true)
}

impl CitationParser for IndexParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Index
    }

    fn parse_bytes(&mut self, bytes: &[u8]) -> Result<(), IngestError> {
        self.rows.reset(read_csv_rows(bytes)?);
        Ok(())
    }

    fn next_citation_data(&mut self) -> Option<Citations> {
        while let Some(row) = self.rows.next_row() {
            let citing = omid(row.citing.as_deref());
            let cited = omid(row.cited.as_deref());
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
