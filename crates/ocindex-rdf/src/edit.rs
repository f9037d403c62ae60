//! Rewriting triple dumps for the unified index or for one service.
//!
//! - `index`: drop creation date, time span and self-citation triples.
//! - `{service}`: drop the citing/cited entity triples and turn the
//!   `rdf:type cito:Citation` tail into a `prov:atLocation` tail pointing at
//!   the service.
//!
//! Line order is preserved. Every `.ttl` file directly under the input
//! directory is mirrored into the output directory; `.zip` dumps are
//! mirrored member by member.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use zip::write::SimpleFileOptions;

use crate::source::{LineStats, find_inputs};
use crate::{RdfError, RdfProgress};

const INDEX_DROP: [&str; 4] = [
    "hasCitationCreationDate",
    "hasCitationTimeSpan",
    "JournalSelfCitation",
    "AuthorSelfCitation",
];

const SERVICE_DROP: [&str; 2] = ["hasCitedEntity", "hasCitingEntity"];

const CITATION_TYPE: &str =
    "<http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://purl.org/spar/cito/Citation>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditMode {
    Index,
    /// Lower-cased service tag, e.g. `coci`.
    Service(String),
}

impl FromStr for EditMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        match tag.as_str() {
            "" => Err("empty edit mode".to_string()),
            "index" => Ok(EditMode::Index),
            _ => Ok(EditMode::Service(tag)),
        }
    }
}

impl EditMode {
    fn drops(&self) -> &'static [&'static str] {
        match self {
            EditMode::Index => &INDEX_DROP,
            EditMode::Service(_) => &SERVICE_DROP,
        }
    }

    /// The edited line, or `None` when the line is dropped.
    pub fn edit_line<'a>(&self, line: &'a str) -> Option<Cow<'a, str>> {
        if self.drops().iter().any(|fragment| line.contains(fragment)) {
            return None;
        }
        match self {
            EditMode::Service(tag) if line.contains(CITATION_TYPE) => {
                let location = format!(
                    "<http://www.w3.org/ns/prov#atLocation> <https://w3id.org/oc/index/{tag}/>"
                );
                Some(Cow::Owned(line.replace(CITATION_TYPE, &location)))
            }
            _ => Some(Cow::Borrowed(line)),
        }
    }

    /// Copy `reader` into `writer`, editing line by line.
    ///
    /// Line terminators are kept; lines that are not UTF-8 are dropped.
    pub fn edit_stream(
        &self,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
    ) -> Result<EditStats, RdfError> {
        let mut reader = BufReader::new(reader);
        let mut stats = EditStats::default();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let Ok(line) = std::str::from_utf8(&buf) else {
                stats.lines.skipped += 1;
                continue;
            };
            stats.lines.lines += 1;
            match self.edit_line(line) {
                Some(edited) => writer.write_all(edited.as_bytes())?,
                None => stats.dropped += 1,
            }
        }
        Ok(stats)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditStats {
    pub lines: LineStats,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditReport {
    pub files: usize,
    pub lines: usize,
    pub dropped: usize,
}

fn edit_file(mode: &EditMode, input: &Path, output: &Path) -> Result<EditStats, RdfError> {
    let mut reader = File::open(input)?;
    let mut writer = BufWriter::new(File::create(output)?);
    let stats = mode.edit_stream(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(stats)
}

fn edit_zip(mode: &EditMode, input: &Path, output: &Path) -> Result<EditStats, RdfError> {
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(input)?))?;
    let mut out = zip::ZipWriter::new(BufWriter::new(File::create(output)?));
    let mut stats = EditStats::default();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() || !entry.name().to_lowercase().ends_with(".ttl") {
            out.raw_copy_file(entry)?;
            continue;
        }
        let options = SimpleFileOptions::default().compression_method(entry.compression());
        out.start_file(entry.name().to_string(), options)?;
        let member = mode.edit_stream(&mut entry, &mut out)?;
        stats.lines += member.lines;
        stats.dropped += member.dropped;
    }
    out.finish()?.flush()?;
    Ok(stats)
}

/// Edit every `.ttl` file and `.zip` dump directly under `input_dir` into
/// `out_dir`, keeping file names.
pub fn edit_dir(
    input_dir: &Path,
    out_dir: &Path,
    mode: &EditMode,
    mut progress: impl FnMut(RdfProgress),
) -> Result<EditReport, RdfError> {
    std::fs::create_dir_all(out_dir)?;
    let inputs = find_inputs(input_dir, ".ttl", false);
    progress(RdfProgress::Discovered {
        files: inputs.len(),
    });

    let mut report = EditReport::default();
    for path in &inputs {
        let Some(name) = path.file_name() else {
            continue;
        };
        let target = out_dir.join(name);
        let is_zip = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
        let stats = if is_zip {
            edit_zip(mode, path, &target)?
        } else {
            edit_file(mode, path, &target)?
        };
        tracing::info!(
            input = %path.display(),
            output = %target.display(),
            lines = stats.lines.lines,
            dropped = stats.dropped,
            "edited triples"
        );
        progress(RdfProgress::FileDone {
            file: path.display().to_string(),
            lines: stats.lines.lines,
            skipped: stats.lines.skipped,
        });
        report.files += 1;
        report.lines += stats.lines.lines;
        report.dropped += stats.dropped;
    }

    progress(RdfProgress::Finished {
        files: report.files,
        records: report.lines - report.dropped,
    });
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::tests::write_zip;

    const CI: &str = "<https://w3id.org/oc/index/ci/0601-0602>";

    fn triples() -> String {
        [
            format!("{CI} {CITATION_TYPE} .\n"),
            format!("{CI} <http://purl.org/spar/cito/hasCitingEntity> <https://w3id.org/oc/meta/br/0601> .\n"),
            format!("{CI} <http://purl.org/spar/cito/hasCitationCreationDate> \"2020\" .\n"),
            format!("{CI} <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://purl.org/spar/cito/JournalSelfCitation> .\n"),
        ]
        .concat()
    }

    #[test]
    fn modes_parse() {
        assert_eq!("index".parse::<EditMode>(), Ok(EditMode::Index));
        assert_eq!(" COCI ".parse::<EditMode>(), Ok(EditMode::Service("coci".into())));
        assert!("".parse::<EditMode>().is_err());
    }

    #[test]
    fn index_mode_drops_dates_and_self_citations() {
        let mut out = Vec::new();
        let stats = EditMode::Index
            .edit_stream(&mut triples().as_bytes(), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(stats.dropped, 2);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("hasCitingEntity"));
        assert!(text.contains(CITATION_TYPE));
    }

    #[test]
    fn service_mode_rewrites_type_tail() {
        let mode = EditMode::Service("coci".into());
        let mut out = Vec::new();
        mode.edit_stream(&mut triples().as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let first = text.lines().next().unwrap();
        assert_eq!(
            first,
            format!(
                "{CI} <http://www.w3.org/ns/prov#atLocation> <https://w3id.org/oc/index/coci/> ."
            )
        );
        assert!(!text.contains("hasCitingEntity"));
        // creation date survives in service mode
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn edit_dir_mirrors_files_and_archives() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir(&input).unwrap();
        std::fs::write(input.join("a.ttl"), triples()).unwrap();
        write_zip(
            &input.join("b.zip"),
            &[("b.ttl", triples().as_bytes()), ("README", &b"keep me"[..])],
        );

        let out = dir.path().join("out");
        let report = edit_dir(&input, &out, &EditMode::Index, |_| {}).unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.dropped, 4);
        assert_eq!(
            std::fs::read_to_string(out.join("a.ttl")).unwrap().lines().count(),
            2
        );
        let mut archive = zip::ZipArchive::new(File::open(out.join("b.zip")).unwrap()).unwrap();
        let mut body = String::new();
        archive.by_name("b.ttl").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body.lines().count(), 2);
        let mut readme = String::new();
        archive.by_name("README").unwrap().read_to_string(&mut readme).unwrap();
        assert_eq!(readme, "keep me");
    }
}
