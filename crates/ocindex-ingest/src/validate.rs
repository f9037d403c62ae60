//! Dropping citations that are already indexed.
//!
//! A citation table (`citing`, `cited`, ... columns) is reduced to the rows
//! whose OCI is new: not in the index and not seen earlier in the run. The
//! verdict for every OCI lives in a shared map, `false` while the OCI is new
//! and `true` once it is known or kept.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use csv::StringRecord;

use crate::IngestError;
use crate::oci::OciMinter;
use crate::preprocess::{get_all_files, read_member};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ValidateReport {
    pub files: usize,
    pub kept: usize,
    pub dropped: usize,
}

/// The `oci` column of every CSV under `input`, without `oci:` prefixes.
pub fn known_ocis(input: &Path) -> Result<HashSet<String>, IngestError> {
    let (members, handle) = get_all_files(input, ".csv")?;
    let mut known = HashSet::new();
    for member in &members {
        let bytes = read_member(member, handle.as_ref())?;
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let Some(column) = reader.headers()?.iter().position(|h| h == "oci") else {
            tracing::warn!(member = %member, "no oci column");
            continue;
        };
        for record in reader.records() {
            if let Some(oci) = record?.get(column) {
                known.insert(oci.trim().trim_start_matches("oci:").to_string());
            }
        }
    }
    tracing::info!(input = %input.display(), ocis = known.len(), "loaded indexed OCIs");
    Ok(known)
}

struct Table {
    headers: StringRecord,
    rows: Vec<StringRecord>,
    citing: usize,
    cited: usize,
}

fn read_table(path: &Path) -> Result<Table, IngestError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| IngestError::MalformedInputFile {
                path: path.to_path_buf(),
                reason: format!("no {} column", name),
            })
    };
    let (citing, cited) = (column("citing")?, column("cited")?);
    let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
    Ok(Table {
        headers,
        rows,
        citing,
        cited,
    })
}

fn oci_of(table: &Table, row: &StringRecord, minter: &mut OciMinter) -> Option<String> {
    minter.mint(row.get(table.citing)?, row.get(table.cited)?)
}

/// OCIs of the citations in `path` that `verdicts` has no answer for yet,
/// each listed once.
pub fn build_oci_query(
    path: &Path,
    minter: &mut OciMinter,
    verdicts: &HashMap<String, bool>,
) -> Result<Vec<String>, IngestError> {
    let table = read_table(path)?;
    let mut listed = HashSet::new();
    let mut query = Vec::new();
    for row in &table.rows {
        let Some(oci) = oci_of(&table, row, minter) else {
            continue;
        };
        if !verdicts.contains_key(&oci) && listed.insert(oci.clone()) {
            query.push(oci);
        }
    }
    tracing::debug!(path = %path.display(), query = query.len(), "built OCI query");
    Ok(query)
}

/// Record, for each OCI in `query`, whether it is already indexed.
pub fn answer_query(query: Vec<String>, known: &HashSet<String>, verdicts: &mut HashMap<String, bool>) {
    for oci in query {
        let indexed = known.contains(&oci);
        verdicts.insert(oci, indexed);
    }
}

fn csv_inputs(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut inputs: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "csv"))
        .collect();
    inputs.sort();
    Ok(inputs)
}

/// Write to `output_dir` a copy of every CSV directly under `input_dir`,
/// keeping only the rows whose OCI `verdicts` marks as new. Kept OCIs are
/// marked so later repeats drop.
pub fn validate_citations(
    input_dir: &Path,
    verdicts: &mut HashMap<String, bool>,
    minter: &mut OciMinter,
    output_dir: &Path,
) -> Result<ValidateReport, IngestError> {
    std::fs::create_dir_all(output_dir)?;
    let mut report = ValidateReport::default();
    for path in csv_inputs(input_dir)? {
        let table = read_table(&path)?;
        let Some(name) = path.file_name() else {
            continue;
        };
        let mut writer = csv::Writer::from_path(output_dir.join(name))?;
        writer.write_record(&table.headers)?;
        let (mut kept, mut dropped) = (0, 0);
        for row in &table.rows {
            let new = oci_of(&table, row, minter)
                .and_then(|oci| verdicts.get_mut(&oci))
                .filter(|indexed| !**indexed)
                .map(|indexed| *indexed = true)
                .is_some();
            if new {
                writer.write_record(row)?;
                kept += 1;
            } else {
                dropped += 1;
            }
        }
        writer.flush()?;
        tracing::info!(file = %path.display(), kept, dropped, "validated citations");
        report.files += 1;
        report.kept += kept;
        report.dropped += dropped;
    }
    Ok(report)
}

/// Query every CSV under `input_dir` against `known`, then write the new
/// citations to `output_dir`.
pub fn validate_against(
    input_dir: &Path,
    known: &HashSet<String>,
    minter: &mut OciMinter,
    output_dir: &Path,
) -> Result<ValidateReport, IngestError> {
    let mut verdicts = HashMap::new();
    for path in csv_inputs(input_dir)? {
        let query = build_oci_query(&path, minter, &verdicts)?;
        answer_query(query, known, &mut verdicts);
    }
    validate_citations(input_dir, &mut verdicts, minter, output_dir)
}

#[cfg(test)]
mod tests {
    use ocindex_core::Scheme;

    use super::*;
    use crate::oci::OciLookup;

    fn minter() -> OciMinter {
        OciMinter::new(Scheme::Omid, "", OciLookup::new())
    }

    const TABLE: &str = "id,citing,cited\n\
                         a,omid:br/061,omid:br/062\n\
                         b,omid:br/061,omid:br/063\n\
                         c,omid:br/061,omid:br/062\n\
                         d,omid:br/061,nonsense\n";

    // ── build_oci_query ────────────────────────────────────────────────

    #[test]
    fn query_lists_unanswered_ocis_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.csv");
        std::fs::write(&path, TABLE).unwrap();

        let verdicts = HashMap::from([("061-063".to_string(), true)]);
        let query = build_oci_query(&path, &mut minter(), &verdicts).unwrap();
        assert_eq!(query, vec!["061-062".to_string()]);
    }

    #[test]
    fn tables_without_citing_column_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.csv");
        std::fs::write(&path, "source,target\nx,y\n").unwrap();
        assert!(matches!(
            build_oci_query(&path, &mut minter(), &HashMap::new()),
            Err(IngestError::MalformedInputFile { .. })
        ));
    }

    // ── validate_citations ─────────────────────────────────────────────

    #[test]
    fn keeps_new_citations_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        let index = dir.path().join("index");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&index).unwrap();
        std::fs::write(input.join("part.csv"), TABLE).unwrap();
        std::fs::write(input.join("notes.txt"), "ignored").unwrap();
        std::fs::write(index.join("ci.csv"), "oci,citing,cited\noci:061-063,,\n").unwrap();

        let known = known_ocis(&index).unwrap();
        assert!(known.contains("061-063"));

        let mut minter = minter();
        let mut verdicts = HashMap::new();
        let query = build_oci_query(&input.join("part.csv"), &mut minter, &verdicts).unwrap();
        answer_query(query, &known, &mut verdicts);
        assert_eq!(verdicts.get("061-062"), Some(&false));
        assert_eq!(verdicts.get("061-063"), Some(&true));

        let report = validate_citations(&input, &mut verdicts, &mut minter, &output).unwrap();
        assert_eq!(
            report,
            ValidateReport {
                files: 1,
                kept: 1,
                dropped: 3,
            }
        );
        assert_eq!(
            std::fs::read_to_string(output.join("part.csv")).unwrap(),
            "id,citing,cited\na,omid:br/061,omid:br/062\n"
        );
        assert_eq!(verdicts.get("061-062"), Some(&true));
    }

    #[test]
    fn repeats_across_files_are_kept_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("1.csv"), "citing,cited
omid:br/061,omid:br/062
").unwrap();
        std::fs::write(
            input.join("2.csv"),
            "citing,cited
omid:br/061,omid:br/062
omid:br/063,omid:br/062
",
        )
        .unwrap();

        let known = HashSet::from(["063-062".to_string()]);
        let output = dir.path().join("out");
        let report = validate_against(&input, &known, &mut minter(), &output).unwrap();
        assert_eq!(
            report,
            ValidateReport {
                files: 2,
                kept: 1,
                dropped: 2,
            }
        );
        assert_eq!(
            std::fs::read_to_string(output.join("2.csv")).unwrap(),
            "citing,cited\n"
        );
    }
}
