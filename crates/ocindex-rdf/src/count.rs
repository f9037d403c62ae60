//! Citation counts: distinct citing entities per cited entity.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use crate::global::GlobalIndex;
use crate::source::{LineStats, find_inputs, for_each_line, for_each_member};
use crate::triple::split_citation_id;
use crate::{RdfError, RdfProgress};

pub const COUNT_FILE: &str = "citations.csv";

/// What the counter reads: triple files or `rdf2csv` tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Rdf,
    Csv,
}

impl InputType {
    pub fn extension(self) -> &'static str {
        match self {
            InputType::Rdf => ".ttl",
            InputType::Csv => ".csv",
        }
    }
}

impl FromStr for InputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rdf" | "ttl" => Ok(InputType::Rdf),
            "csv" => Ok(InputType::Csv),
            other => Err(format!("unknown input type: {} (expected rdf or csv)", other)),
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputType::Rdf => "rdf",
            InputType::Csv => "csv",
        })
    }
}

/// Fold a `citation,source` table into `index`.
fn absorb_table(
    index: &mut GlobalIndex,
    reader: &mut dyn Read,
    origin: &str,
) -> Result<LineStats, RdfError> {
    let mut stats = LineStats::default();
    let mut rows = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    for row in rows.records() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                stats.skipped += 1;
                tracing::debug!(origin, error = %e, "skipping unreadable row");
                continue;
            }
        };
        stats.lines += 1;
        match row.get(0).and_then(split_citation_id) {
            Some((citing, cited)) => index.absorb(citing, cited, row.get(1)),
            None => stats.skipped += 1,
        }
    }
    Ok(stats)
}

/// Read every input under `input_dir` into one index.
pub fn count_citations(
    input_dir: &Path,
    input_type: InputType,
    mut progress: impl FnMut(RdfProgress),
) -> Result<GlobalIndex, RdfError> {
    let ext = input_type.extension();
    let inputs = find_inputs(input_dir, ext, true);
    tracing::info!(dir = %input_dir.display(), files = inputs.len(), kind = %input_type, "counting citations");
    progress(RdfProgress::Discovered {
        files: inputs.len(),
    });

    let mut total = GlobalIndex::new();
    for path in &inputs {
        let mut index = GlobalIndex::new();
        let stats = match input_type {
            InputType::Rdf => for_each_line(path, ext, |line| {
                index.absorb_line(line);
            })?,
            InputType::Csv => {
                let mut stats = LineStats::default();
                for_each_member(path, ext, |name, reader| {
                    stats += absorb_table(&mut index, reader, name)?;
                    Ok(())
                })?;
                stats
            }
        };
        total.merge(index);
        progress(RdfProgress::FileDone {
            file: path.display().to_string(),
            lines: stats.lines,
            skipped: stats.skipped,
        });
    }

    progress(RdfProgress::Finished {
        files: inputs.len(),
        records: total.len(),
    });
    Ok(total)
}

/// Write `omid,citations` rows, sorted by identifier.
pub fn write_counts(counts: &BTreeMap<String, usize>, path: &Path) -> Result<(), RdfError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["omid", "citations"])?;
    for (id, count) in counts {
        writer.write_record([id.as_str(), count.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Count the citations of `input_dir` and write `citations.csv` into `out_dir`.
pub fn citation_count(
    input_dir: &Path,
    input_type: InputType,
    out_dir: &Path,
    progress: impl FnMut(RdfProgress),
) -> Result<BTreeMap<String, usize>, RdfError> {
    let counts = count_citations(input_dir, input_type, progress)?.citation_counts();
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(COUNT_FILE);
    write_counts(&counts, &path)?;
    tracing::info!(path = %path.display(), cited = counts.len(), "wrote citation counts");
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::tests::write_zip;

    fn ci(citing: &str, cited: &str) -> String {
        format!(
            "<https://w3id.org/oc/index/ci/{citing}-{cited}> \
             <http://www.w3.org/ns/prov#atLocation> <https://w3id.org/oc/index/coci/> .\n"
        )
    }

    #[test]
    fn input_type_parses() {
        assert_eq!("RDF".parse::<InputType>(), Ok(InputType::Rdf));
        assert_eq!("csv".parse::<InputType>(), Ok(InputType::Csv));
        assert!("json".parse::<InputType>().is_err());
    }

    #[test]
    fn counts_from_zipped_triples() {
        let dir = tempfile::tempdir().unwrap();
        let body = [ci("A", "X"), ci("B", "X")].concat();
        write_zip(&dir.path().join("dump.zip"), &[("part.ttl", body.as_bytes())]);

        let counts = count_citations(dir.path(), InputType::Rdf, |_| {})
            .unwrap()
            .citation_counts();
        assert_eq!(counts["X"], 2);
    }

    #[test]
    fn counts_from_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("dump.csv"),
            "citation,source\nA-X,coci\nA-X,doci\nB-X,coci\nbroken,coci\nA-Y,coci\n",
        )
        .unwrap();
        let out = dir.path().join("out");

        let counts = citation_count(dir.path(), InputType::Csv, &out, |_| {}).unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(
            std::fs::read_to_string(out.join(COUNT_FILE)).unwrap(),
            "omid,citations\nX,2\nY,1\n"
        );
    }
}
