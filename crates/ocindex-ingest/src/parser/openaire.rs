use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use ocindex_core::identifier::normalise;
use ocindex_core::{CitationData, Scheme};
use serde::Deserialize;
use serde_json::Value;

use super::{CitationParser, Citations, ParserKind, Rows, read_csv_rows};
use crate::IngestError;
use crate::preprocess::{get_all_files, read_member};

const GZIP_MAGIC: &[u8] = b"\x1f\x8b";

/// Map key for an identifier of one of the accepted schemas.
fn key(schema: &str, id: &str) -> Option<String> {
    match schema.trim().to_lowercase().as_str() {
        "doi" => normalise(Scheme::Doi, id, true),
        "pmid" => normalise(Scheme::Pmid, id, true),
        "pmc" => {
            let body = id.trim().to_lowercase();
            (!body.is_empty()).then(|| format!("pmc:{}", body))
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct MapRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    meta: Option<String>,
}

/// DOI, PMID and PMC identifiers mapped to the OMID of the same work.
#[derive(Debug, Default, Clone)]
pub struct OmidMap {
    omids: HashMap<String, String>,
}

impl OmidMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every CSV (`id`, `meta` columns) under `input`, a directory,
    /// `.zip` or `.tar.gz`. An `id` cell may hold several space-separated
    /// `schema:value` identifiers.
    pub fn load(input: &Path) -> Result<Self, IngestError> {
        let (members, handle) = get_all_files(input, ".csv")?;
        let mut map = Self::new();
        for member in &members {
            let bytes = read_member(member, handle.as_ref())?;
            for row in read_csv_rows::<MapRow>(&bytes)? {
                let (Some(ids), Some(meta)) = (row.id, row.meta) else {
                    continue;
                };
                for id in ids.split_whitespace() {
                    map.insert(id, &meta)
                        .map_err(|reason| IngestError::MalformedInputFile {
                            path: PathBuf::from(member.to_string()),
                            reason,
                        })?;
                }
            }
        }
        tracing::info!(input = %input.display(), ids = map.len(), "loaded OMID map");
        Ok(map)
    }

    /// Map `schema:value` to `meta`. Ids of other schemas and unparseable
    /// OMIDs are ignored; mapping one id to two OMIDs is an error.
    pub fn insert(&mut self, id: &str, meta: &str) -> Result<(), String> {
        let Some((schema, value)) = id.split_once(':') else {
            return Ok(());
        };
        let (Some(key), Some(omid)) = (key(schema, value), normalise(Scheme::Omid, meta, true))
        else {
            return Ok(());
        };
        match self.omids.get(&key) {
            Some(known) if *known != omid => {
                Err(format!("{} maps to both {} and {}", key, known, omid))
            }
            Some(_) => Ok(()),
            None => {
                self.omids.insert(key, omid);
                Ok(())
            }
        }
    }

    /// The OMID of `value` in `schema`, if mapped.
    pub fn get(&self, schema: &str, value: &str) -> Option<&str> {
        self.omids.get(&key(schema, value)?).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.omids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.omids.is_empty()
    }
}

/// OpenAIRE Graph relations, gzipped JSON lines of
/// `{"relationship": {"name": ...}, "source": {...}, "target": {...}}`.
///
/// `Cites` reads source → target and `IsCitedBy` target → source. Each side
/// is the OMID of its first identifier found in the map; relations with an
/// unmapped side are dropped.
#[derive(Debug, Default)]
pub struct OpenAireParser {
    map: Arc<OmidMap>,
    rows: Rows<Value>,
}

impl OpenAireParser {
    pub fn new(map: Arc<OmidMap>) -> Self {
        Self {
            map,
            rows: Rows::default(),
        }
    }

    fn omid_of(map: &OmidMap, side: &Value) -> Option<String> {
        side["identifier"]
            .as_array()?
            .iter()
            .find_map(|id| map.get(id["schema"].as_str()?, id["identifier"].as_str()?))
            .map(str::to_string)
    }

    fn citation_of(map: &OmidMap, row: &Value) -> Option<CitationData> {
        let (citing, cited) = match row["relationship"]["name"].as_str()? {
            "Cites" => (&row["source"], &row["target"]),
            "IsCitedBy" => (&row["target"], &row["source"]),
            _ => return None,
        };
        Some(CitationData::new(
            Self::omid_of(map, citing)?,
            Self::omid_of(map, cited)?,
        ))
    }
}

impl CitationParser for OpenAireParser {
    fn kind(&self) -> ParserKind {
        ParserKind::OpenAire
    }

    fn parse_bytes(&mut self, bytes: &[u8]) -> Result<(), IngestError> {
        let mut text = Vec::new();
        if bytes.starts_with(GZIP_MAGIC) {
            GzDecoder::new(bytes).read_to_end(&mut text)?;
        } else {
            text.extend_from_slice(bytes);
        }
        let rows = String::from_utf8_lossy(&text)
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<Value>(line) {
                Ok(row) => Some(row),
                Err(e) => {
                    tracing::debug!(line = n + 1, error = %e, "skipping malformed relation");
                    None
                }
            })
            .collect();
        self.rows.reset(rows);
        Ok(())
    }

    fn next_citation_data(&mut self) -> Option<Citations> {
        while let Some(row) = self.rows.next_row() {
            if let Some(c) = Self::citation_of(&self.map, row) {
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
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn map() -> Arc<OmidMap> {
        let mut map = OmidMap::new();
        map.insert("doi:10.1/A", "omid:br/061").unwrap();
        map.insert("pmid:29105", "br/062").unwrap();
        map.insert("pmc:PMC7", "omid:br/063").unwrap();
        Arc::new(map)
    }

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    // ── OmidMap ────────────────────────────────────────────────────────

    #[test]
    fn map_keys_are_normalised() {
        let map = map();
        assert_eq!(map.get("doi", "https://doi.org/10.1/a"), Some("omid:br/061"));
        assert_eq!(map.get("PMID", "29105"), Some("omid:br/062"));
        assert_eq!(map.get("pmc", "pmc7"), Some("omid:br/063"));
        assert_eq!(map.get("arxiv", "1234.5678"), None);
    }

    #[test]
    fn conflicting_omids_are_rejected() {
        let mut map = OmidMap::new();
        map.insert("doi:10.1/a", "omid:br/061").unwrap();
        map.insert("doi:10.1/A", "omid:br/061").unwrap();
        assert!(map.insert("doi:10.1/a", "omid:br/069").is_err());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn map_loads_csv_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("part.csv"),
            "id,meta\n\"doi:10.1/a pmid:29105\",omid:br/061\nNone,\n",
        )
        .unwrap();
        let map = OmidMap::load(dir.path()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("pmid", "29105"), Some("omid:br/061"));

        std::fs::write(dir.path().join("more.csv"), "id,meta\ndoi:10.1/a,omid:br/062\n").unwrap();
        assert!(matches!(
            OmidMap::load(dir.path()),
            Err(IngestError::MalformedInputFile { .. })
        ));
    }

    // ── relations ──────────────────────────────────────────────────────

    const RELATIONS: &str = r#"{"relationship": {"name": "Cites"}, "source": {"identifier": [{"schema": "arxiv", "identifier": "1"}, {"schema": "doi", "identifier": "10.1/a"}]}, "target": {"identifier": [{"schema": "pmid", "identifier": "29105"}]}}
{"relationship": {"name": "IsCitedBy"}, "source": {"identifier": [{"schema": "pmc", "identifier": "PMC7"}]}, "target": {"identifier": [{"schema": "doi", "identifier": "10.1/A"}]}}
{"relationship": {"name": "IsSupplementTo"}, "source": {"identifier": [{"schema": "doi", "identifier": "10.1/a"}]}, "target": {"identifier": [{"schema": "pmid", "identifier": "29105"}]}}
{"relationship": {"name": "Cites"}, "source": {"identifier": [{"schema": "doi", "identifier": "10.1/a"}]}, "target": {"identifier": [{"schema": "doi", "identifier": "10.9/unmapped"}]}}
not json
"#;

    #[test]
    fn cites_and_is_cited_by_point_the_same_way() {
        let mut parser = OpenAireParser::new(map());
        parser.parse_bytes(&gzip(RELATIONS)).unwrap();
        assert_eq!(parser.items(), 4);
        assert_eq!(
            parser.collect_all(),
            vec![
                CitationData::new("omid:br/061", "omid:br/062"),
                CitationData::new("omid:br/061", "omid:br/063"),
            ]
        );
        assert_eq!(parser.current_item(), 4);
    }

    #[test]
    fn plain_json_lines_are_accepted() {
        let mut parser = OpenAireParser::new(map());
        parser.parse_bytes(RELATIONS.as_bytes()).unwrap();
        assert_eq!(parser.collect_all().len(), 2);
    }

    #[test]
    fn an_empty_map_yields_nothing() {
        let mut parser = OpenAireParser::default();
        parser.parse_bytes(&gzip(RELATIONS)).unwrap();
        assert!(parser.collect_all().is_empty());
    }
}
