use ocindex_core::CitationData;
use serde::Deserialize;

use super::{CitationParser, Citations, ParserKind, Rows, date, doi, read_csv_rows};
use crate::IngestError;

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    citing_id: Option<String>,
    #[serde(default)]
    cited_id: Option<String>,
    #[serde(default)]
    citing_publication_date: Option<String>,
    #[serde(default)]
    cited_publication_date: Option<String>,
}

/// Crowdsourced citation CSV: one tuple per row, dates included.
#[derive(Debug, Default)]
pub struct CrowdsourcedParser {
    rows: Rows<Row>,
}

fn citation_of(row: &Row) -> Option<CitationData> {
    let citing = doi(row.citing_id.as_deref())?;
    let cited = doi(row.cited_id.as_deref())?;
    Some(CitationData::new(citing, cited).with_dates(
        date(row.citing_publication_date.as_deref()),
        date(row.cited_publication_date.as_deref()),
    ))
}

impl CitationParser for CrowdsourcedParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Crowdsourced
    }

    fn parse_bytes(&mut self, bytes: &[u8]) -> Result<(), IngestError> {
        self.rows.reset(read_csv_rows(bytes)?);
        Ok(())
    }

    fn next_citation_data(&mut self) -> Option<Citations> {
        while let Some(row) = self.rows.next_row() {
            if let Some(c) = citation_of(row) {
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

    const CSV: &[u8] = b"citing_id,cited_id,citing_publication_date,cited_publication_date
doi:10.1/A,10.2/B,2019-05-01,
bad,10.2/C,2019,2018
10.1/D,https://doi.org/10.2/E,unknown,  2001-02
";

    #[test]
    fn rows_in_order_with_dates() {
        let mut parser = CrowdsourcedParser::default();
        parser.parse_bytes(CSV).unwrap();
        assert_eq!(parser.items(), 3);

        let all = parser.collect_all();
        assert_eq!(
            all,
            vec![
                CitationData::new("10.1/a", "10.2/b").with_dates(Some("2019-05-01".into()), None),
                CitationData::new("10.1/d", "10.2/e").with_dates(None, Some("2001-02".into())),
            ]
        );
        assert_eq!(parser.current_item(), 3);
    }

    #[test]
    fn header_only_file() {
        let mut parser = CrowdsourcedParser::default();
        parser
            .parse_bytes(b"citing_id,cited_id,citing_publication_date,cited_publication_date\n")
            .unwrap();
        assert_eq!(parser.items(), 0);
        assert!(parser.next_citation_data().is_none());
    }
}
