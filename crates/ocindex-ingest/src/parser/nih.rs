use ocindex_core::identifier::normalise;
use ocindex_core::{CitationData, Scheme, check_date};
use serde::Deserialize;

use super::{CitationParser, Citations, ParserKind, Rows, read_csv_rows};
use crate::IngestError;

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    pmid: Option<String>,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    references: Option<String>,
}

/// NIH open citation collection CSV (`pmid`, `year`, space-separated
/// `references`). Emits one list per citing article.
#[derive(Debug, Default)]
pub struct NihParser {
    rows: Rows<Row>,
}

fn pmid(raw: &str) -> Option<String> {
    normalise(Scheme::Pmid, raw, false)
}

/// First four digits of the year cell (`2019.0` → `2019`).
fn year(raw: Option<&str>) -> Option<String> {
    let digits: String = raw?.chars().filter(char::is_ascii_digit).take(4).collect();
    check_date(&digits)
}

fn citations_of(row: &Row) -> Option<Vec<CitationData>> {
    let citing = pmid(row.pmid.as_deref()?)?;
    let citing_date = year(row.year.as_deref());
    let cited: Vec<CitationData> = row
        .references
        .as_deref()?
        .split_whitespace()
        .filter_map(pmid)
        .map(|cited| {
            CitationData::new(citing.clone(), cited).with_dates(citing_date.clone(), None)
        })
        .collect();
    (!cited.is_empty()).then_some(cited)
}

impl CitationParser for NihParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Nih
    }

    fn parse_bytes(&mut self, bytes: &[u8]) -> Result<(), IngestError> {
        self.rows.reset(read_csv_rows(bytes)?);
        Ok(())
    }

    fn next_citation_data(&mut self) -> Option<Citations> {
        while let Some(row) = self.rows.next_row() {
            if let Some(list) = citations_of(row) {
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
    fn references_become_one_list_per_row() {
        let mut parser = NihParser::default();
        parser
            .parse_bytes(b"pmid,year,references\n29105,1998.0,123 0456 x\n7,,\n8,2001,\n")
            .unwrap();
        assert_eq!(parser.items(), 3);
        let first = parser.next_citation_data().unwrap();
        assert_eq!(
            first,
            Citations::Many(vec![
                CitationData::new("29105", "123").with_dates(Some("1998".into()), None),
                CitationData::new("29105", "456").with_dates(Some("1998".into()), None),
            ])
        );
        assert!(parser.next_citation_data().is_none());
        assert_eq!(parser.current_item(), 3);
    }

    #[test]
    fn year_cells() {
        assert_eq!(year(Some("2019.0")), Some("2019".into()));
        assert_eq!(year(Some("")), None);
        assert_eq!(year(Some("19")), None);
        assert_eq!(year(None), None);
    }
}
