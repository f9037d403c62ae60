//! Open Citation Identifiers.
//!
//! An OCI is `{prefix}{citing}-{prefix}{cited}`, where `prefix` names the
//! supplier (`020` for Crossref DOIs, ...). OMIDs contribute their digits.
//! DOIs are spelled out character by character through a lookup table of
//! two-digit codes; codes match `9*[0-8][0-9]`, so `89` is followed by
//! `900` and the table never runs out.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use ocindex_core::Scheme;
use ocindex_core::identifier;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::IngestError;

/// File name of the lookup table under the data directory.
pub const LOOKUP_FILE: &str = "lookup.csv";

static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"9*[0-8][0-9]").unwrap());
static OCI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+-[0-9]+$").unwrap());

/// Whether `oci` (with or without `oci:`) is made of two digit runs.
pub fn is_well_formed(oci: &str) -> bool {
    OCI_RE.is_match(oci.trim().trim_start_matches("oci:"))
}

#[derive(Debug, Deserialize)]
struct LookupRow {
    c: String,
    code: String,
}

/// Character to code table used to spell DOIs as digits.
#[derive(Debug, Clone, Default)]
pub struct OciLookup {
    codes: HashMap<char, String>,
    chars: HashMap<String, char>,
    last: Option<u64>,
    /// Entries minted since the table was loaded, in minting order.
    added: Vec<(char, String)>,
}

impl OciLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `"c","code"` table; a missing file is an empty table.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, IngestError> {
        let mut table = Self::new();
        let mut csv = csv::Reader::from_reader(reader);
        for row in csv.deserialize::<LookupRow>() {
            let row = row?;
            let Some(c) = row.c.chars().next() else {
                continue;
            };
            if let Ok(n) = row.code.parse::<u64>() {
                table.last = Some(table.last.map_or(n, |last| last.max(n)));
            }
            table.codes.insert(c, row.code.clone());
            table.chars.insert(row.code, c);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Entries minted since the table was loaded.
    pub fn added(&self) -> &[(char, String)] {
        &self.added
    }

    fn next_code(&mut self) -> String {
        let next = match self.last {
            None => 0,
            Some(last) if last % 100 == 89 => (last + 1) * 10,
            Some(last) => last + 1,
        };
        self.last = Some(next);
        format!("{:02}", next)
    }

    fn code_for(&mut self, c: char) -> String {
        if let Some(code) = self.codes.get(&c) {
            return code.clone();
        }
        let code = self.next_code();
        self.codes.insert(c, code.clone());
        self.chars.insert(code.clone(), c);
        self.added.push((c, code.clone()));
        code
    }

    /// Spell `text` as digits, minting codes for unseen characters.
    pub fn encode(&mut self, text: &str) -> String {
        text.chars().map(|c| self.code_for(c)).collect()
    }

    /// Read digits back into text; `None` if a code is not in the table.
    pub fn decode(&self, digits: &str) -> Option<String> {
        let mut out = String::new();
        let mut consumed = 0;
        for m in CODE_RE.find_iter(digits) {
            if m.start() != consumed {
                return None;
            }
            out.push(*self.chars.get(m.as_str())?);
            consumed = m.end();
        }
        (consumed == digits.len()).then_some(out)
    }

    /// Append the minted entries to `path`, writing the header for a new file.
    pub fn save(&mut self, path: &Path) -> Result<(), IngestError> {
        if self.added.is_empty() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        let mut prefix = Vec::new();
        if len == 0 {
            prefix.extend_from_slice(b"\"c\",\"code\"\n");
        } else {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                prefix.push(b'\n');
            }
        }
        file.write_all(&prefix)?;

        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(file);
        for (c, code) in &self.added {
            writer.write_record([c.to_string().as_str(), code.as_str()])?;
        }
        writer.flush()?;
        tracing::debug!(path = %path.display(), added = self.added.len(), "extended OCI lookup table");
        self.added.clear();
        Ok(())
    }
}

/// Mints OCIs for the citations of one service.
#[derive(Debug, Clone)]
pub struct OciMinter {
    scheme: Scheme,
    prefix: String,
    lookup: OciLookup,
}

impl OciMinter {
    pub fn new(scheme: Scheme, prefix: impl Into<String>, lookup: OciLookup) -> Self {
        Self {
            scheme,
            prefix: prefix.into(),
            lookup,
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn lookup_mut(&mut self) -> &mut OciLookup {
        &mut self.lookup
    }

    /// Digits one side contributes, or `None` if `id` does not normalise.
    fn side(&mut self, id: &str) -> Option<String> {
        let body = identifier::normalise(self.scheme, id, false)?;
        let digits = match self.scheme {
            Scheme::Omid => body.trim_start_matches("br/").to_string(),
            Scheme::Pmid => body,
            Scheme::Doi => self.lookup.encode(body.strip_prefix("10.").unwrap_or(&body)),
            _ => self.lookup.encode(&body),
        };
        Some(format!("{}{}", self.prefix, digits))
    }

    /// The OCI of `citing` → `cited`, without the `oci:` prefix.
    pub fn mint(&mut self, citing: &str, cited: &str) -> Option<String> {
        let citing = self.side(citing)?;
        let cited = self.side(cited)?;
        Some(format!("{}-{}", citing, cited))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── lookup table ───────────────────────────────────────────────────

    #[test]
    fn codes_skip_the_nineties() {
        let mut lookup = OciLookup::new();
        let codes: Vec<String> = (0..92).map(|_| lookup.next_code()).collect();
        assert_eq!(codes[0], "00");
        assert_eq!(codes[9], "09");
        assert_eq!(codes[89], "89");
        assert_eq!(codes[90], "900");
        assert_eq!(codes[91], "901");
    }

    #[test]
    fn loaded_tables_continue_after_their_last_code() {
        let table = "\"c\",\"code\"\n\"0\",\"00\"\n\"1\",\"01\"\n\".\",\"89\"";
        let mut lookup = OciLookup::from_reader(table.as_bytes()).unwrap();
        assert_eq!(lookup.len(), 3);
        assert_eq!(lookup.encode("10."), "010089");
        assert!(lookup.added().is_empty());
        assert_eq!(lookup.encode("a"), "900");
        assert_eq!(lookup.added(), &[('a', "900".to_string())]);
        assert_eq!(lookup.decode("01900").as_deref(), Some("1a"));
        assert_eq!(lookup.decode("0177"), None);
    }

    #[test]
    fn save_appends_only_new_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lookup.csv");
        std::fs::write(&path, "\"c\",\"code\"\n\"0\",\"00\"").unwrap();

        let mut lookup = OciLookup::load(&path).unwrap();
        lookup.encode("0/");
        lookup.save(&path).unwrap();
        assert!(lookup.added().is_empty());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "\"c\",\"code\"\n\"0\",\"00\"\n\"/\",\"01\"\n"
        );

        let reloaded = OciLookup::load(&path).unwrap();
        assert_eq!(reloaded.decode("0100").as_deref(), Some("/0"));
    }

    #[test]
    fn save_creates_a_table_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lookup.csv");
        let mut lookup = OciLookup::new();
        lookup.encode("x");
        lookup.save(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "\"c\",\"code\"\n\"x\",\"00\"\n");
    }

    // ── minting ────────────────────────────────────────────────────────

    #[test]
    fn omids_contribute_their_digits() {
        let mut minter = OciMinter::new(Scheme::Omid, "", OciLookup::new());
        assert_eq!(
            minter.mint("omid:br/06101", "https://w3id.org/oc/meta/br/06202").as_deref(),
            Some("06101-06202")
        );
        assert_eq!(minter.mint("omid:br/06101", "ra/0601"), None);
    }

    #[test]
    fn dois_are_spelled_through_the_lookup() {
        let mut minter = OciMinter::new(Scheme::Doi, "020", OciLookup::new());
        let oci = minter.mint("10.1/a", "doi:10.1/b").unwrap();
        // "1" -> 00, "/" -> 01, "a" -> 02, "b" -> 03
        assert_eq!(oci, "020000102-020000103");
        assert!(is_well_formed(&oci));
        assert!(is_well_formed(&format!("oci:{}", oci)));

        let same = minter.mint("https://doi.org/10.1/A", "10.1/B").unwrap();
        assert_eq!(same, oci);
        assert_eq!(minter.lookup_mut().decode("000102").as_deref(), Some("1/a"));
    }

    #[test]
    fn pmids_keep_their_digits() {
        let mut minter = OciMinter::new(Scheme::Pmid, "0160", OciLookup::new());
        assert_eq!(minter.mint("pmid:29105", "0012").as_deref(), Some("016029105-016012"));
        assert!(!is_well_formed("0601-"));
    }
}
