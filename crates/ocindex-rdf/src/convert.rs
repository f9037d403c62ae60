//! `rdf2csv`: one `citation,source` table per zipped triple dump.

use std::path::{Path, PathBuf};

use crate::source::{find_inputs, for_each_line};
use crate::triple::parse_line;
use crate::{RdfError, RdfProgress};

/// Convert every `.zip` directly under `input_dir` into `{stem}.csv` in
/// `out_dir`. Only provenance lines (citation plus source) produce rows.
pub fn rdf2csv(
    input_dir: &Path,
    out_dir: &Path,
    mut progress: impl FnMut(RdfProgress),
) -> Result<Vec<PathBuf>, RdfError> {
    std::fs::create_dir_all(out_dir)?;
    let archives: Vec<PathBuf> = find_inputs(input_dir, ".zip", false);
    progress(RdfProgress::Discovered {
        files: archives.len(),
    });

    let mut written = Vec::with_capacity(archives.len());
    let mut rows_total = 0;
    for archive in &archives {
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = out_dir.join(format!("{stem}.csv"));
        let mut writer = csv::Writer::from_path(&target)?;
        writer.write_record(["citation", "source"])?;

        let mut rows = 0usize;
        let mut failure = None;
        let stats = for_each_line(archive, ".ttl", |line| {
            if failure.is_some() {
                return;
            }
            let Some(citation) = parse_line(line) else {
                return;
            };
            let Some(source) = citation.source else {
                return;
            };
            match writer.write_record([citation.citation_id().as_str(), source]) {
                Ok(()) => rows += 1,
                Err(e) => failure = Some(e),
            }
        })?;
        if let Some(e) = failure {
            return Err(e.into());
        }
        writer.flush()?;

        tracing::info!(archive = %archive.display(), target = %target.display(), rows, "converted dump");
        progress(RdfProgress::FileDone {
            file: archive.display().to_string(),
            lines: stats.lines,
            skipped: stats.skipped,
        });
        rows_total += rows;
        written.push(target);
    }

    progress(RdfProgress::Finished {
        files: written.len(),
        records: rows_total,
    });
    Ok(written)
}
