use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use ocindex_ingest::{EmitReport, GlobReport, ValidateReport};
use ocindex_rdf::{EditReport, PushReport};
use owo_colors::OwoColorize;
use serde_json::Value;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn print_header(w: &mut dyn Write, title: &str, color: ColorMode) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", title.bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "{}", title)?;
        writeln!(w, "{}", sep)?;
    }
    Ok(())
}

fn print_dimmed(w: &mut dyn Write, msg: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "  {}", msg.dimmed())
    } else {
        writeln!(w, "  {}", msg)
    }
}

/// Print the counters of a glob run and, when citations were emitted, of
/// the emitted table or store.
pub fn print_glob_summary(
    w: &mut dyn Write,
    service: &str,
    dest: &Path,
    report: &GlobReport,
    emitted: Option<&EmitReport>,
    stored_in: Option<&Path>,
    color: ColorMode,
) -> std::io::Result<()> {
    print_header(w, &format!("GLOB {}", service.to_uppercase()), color)?;
    writeln!(w, "  Files parsed: {}", report.files)?;
    if report.skipped_files > 0 {
        let msg = format!("Skipped files: {}", report.skipped_files);
        if color.enabled() {
            writeln!(w, "  {}", msg.yellow())?;
        } else {
            writeln!(w, "  {}", msg)?;
        }
    }
    writeln!(w, "  Citation tuples: {}", report.tuples)?;
    writeln!(w, "  Distinct identifiers: {}", report.identifiers)?;
    writeln!(w, "  Resolved remotely: {}", report.resolved)?;
    print_dimmed(w, &format!("Served from cache: {}", report.cache_hits), color)?;

    let invalid = report.identifiers.saturating_sub(report.valid);
    if color.enabled() {
        writeln!(w, "  {} {}", "Valid:".green(), report.valid)?;
        writeln!(w, "  {} {}", "Invalid:".red(), invalid)?;
    } else {
        writeln!(w, "  Valid: {}", report.valid)?;
        writeln!(w, "  Invalid: {}", invalid)?;
    }

    if let Some(emitted) = emitted {
        writeln!(w)?;
        writeln!(w, "  Citations written: {}", emitted.written)?;
        print_dimmed(
            w,
            &format!(
                "Dropped: {} duplicates, {} with an invalid side",
                emitted.duplicates, emitted.invalid
            ),
            color,
        )?;
    }
    writeln!(w)?;
    writeln!(w, "  Glob written to {}", dest.display())?;
    if let Some(dir) = stored_in {
        writeln!(w, "  Citations stored under {}", dir.display())?;
    }
    Ok(())
}

pub fn print_validate_summary(
    w: &mut dyn Write,
    service: &str,
    report: &ValidateReport,
    out: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    print_header(w, &format!("VALIDATE {}", service.to_uppercase()), color)?;
    writeln!(w, "  Files read: {}", report.files)?;
    if color.enabled() {
        writeln!(w, "  {} {}", "New citations:".green(), report.kept)?;
    } else {
        writeln!(w, "  New citations: {}", report.kept)?;
    }
    print_dimmed(
        w,
        &format!("Dropped (indexed or repeated): {}", report.dropped),
        color,
    )?;
    writeln!(w)?;
    writeln!(w, "  Output written to {}", out.display())?;
    Ok(())
}

/// Print how many entities are cited, and the most cited ones.
pub fn print_count_summary(
    w: &mut dyn Write,
    counts: &BTreeMap<String, usize>,
    out: &Path,
    top: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    print_header(w, "CITATION COUNT", color)?;
    let citations: usize = counts.values().sum();
    writeln!(w, "  Cited entities: {}", counts.len())?;
    writeln!(w, "  Citations: {}", citations)?;

    let mut ranked: Vec<(&String, &usize)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    if !ranked.is_empty() && top > 0 {
        writeln!(w)?;
        writeln!(w, "  Most cited:")?;
        for (id, count) in ranked.into_iter().take(top) {
            if color.enabled() {
                writeln!(w, "    {:>8}  {}", count.cyan(), id)?;
            } else {
                writeln!(w, "    {:>8}  {}", count, id)?;
            }
        }
    }
    writeln!(w)?;
    writeln!(w, "  Counts written to {}", out.display())?;
    Ok(())
}

pub fn print_push_summary(
    w: &mut dyn Write,
    report: &PushReport,
    target: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    print_header(w, "GLOBAL INDEX", color)?;
    writeln!(w, "  Files read: {}", report.files)?;
    writeln!(w, "  Citations: {}", report.citations)?;
    writeln!(w, "  List pushes: {}", report.operations)?;
    if report.skipped_lines > 0 {
        print_dimmed(w, &format!("Unreadable lines: {}", report.skipped_lines), color)?;
    }
    writeln!(w)?;
    writeln!(w, "  Pushed to {}", target)?;
    Ok(())
}

pub fn print_edit_summary(
    w: &mut dyn Write,
    report: &EditReport,
    out: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    print_header(w, "EDIT RDF", color)?;
    writeln!(w, "  Files edited: {}", report.files)?;
    writeln!(w, "  Lines read: {}", report.lines)?;
    print_dimmed(w, &format!("Lines dropped: {}", report.dropped), color)?;
    writeln!(w)?;
    writeln!(w, "  Output written to {}", out.display())?;
    Ok(())
}

/// Print the outcome of `check-metadata`.
pub fn print_metadata(
    w: &mut dyn Write,
    field: &str,
    best: Option<&Value>,
    color: ColorMode,
) -> std::io::Result<()> {
    match best {
        Some(value) => {
            if color.enabled() {
                writeln!(w, "Largest value of {}: {}", field.bold(), value.green())
            } else {
                writeln!(w, "Largest value of {}: {}", field, value)
            }
        }
        None => {
            let msg = format!("No item carries {}", field);
            if color.enabled() {
                writeln!(w, "{}", msg.yellow())
            } else {
                writeln!(w, "{}", msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn glob_summary_reports_invalid_and_emission() {
        let report = GlobReport {
            files: 2,
            skipped_files: 1,
            tuples: 5,
            identifiers: 4,
            resolved: 3,
            cache_hits: 1,
            valid: 3,
        };
        let emitted = EmitReport {
            written: 2,
            duplicates: 1,
            invalid: 2,
        };
        let text = render(|w| {
            print_glob_summary(w, "coci", Path::new("/tmp/glob"), &report, Some(&emitted), None, ColorMode(false))
        });
        assert!(text.contains("GLOB COCI"));
        assert!(text.contains("Skipped files: 1"));
        assert!(text.contains("Invalid: 1"));
        assert!(text.contains("Citations written: 2"));
        assert!(text.contains("Dropped: 1 duplicates, 2 with an invalid side"));
        assert!(!text.contains("stored under"));

        let text = render(|w| {
            print_glob_summary(
                w,
                "oroci",
                Path::new("/tmp/glob"),
                &report,
                Some(&emitted),
                Some(Path::new("/srv/index")),
                ColorMode(false),
            )
        });
        assert!(text.contains("Citations stored under /srv/index"));
    }

    #[test]
    fn validate_summary_counts_new_citations() {
        let report = ValidateReport {
            files: 3,
            kept: 10,
            dropped: 4,
        };
        let text = render(|w| {
            print_validate_summary(w, "coci", &report, Path::new("out"), ColorMode(false))
        });
        assert!(text.contains("VALIDATE COCI"));
        assert!(text.contains("New citations: 10"));
        assert!(text.contains("Dropped (indexed or repeated): 4"));
    }

    #[test]
    fn count_summary_ranks_by_count_then_id() {
        let counts = BTreeMap::from([
            ("A".to_string(), 1),
            ("B".to_string(), 3),
            ("C".to_string(), 1),
        ]);
        let text = render(|w| print_count_summary(w, &counts, Path::new("out"), 2, ColorMode(false)));
        assert!(text.contains("Citations: 5"));
        let b = text.find("  B").unwrap();
        let a = text.find("  A").unwrap();
        assert!(b < a);
        assert!(!text.contains("  C\n"));
    }

    #[test]
    fn missing_metadata_is_reported() {
        let text = render(|w| print_metadata(w, "reference-count", None, ColorMode(false)));
        assert_eq!(text, "No item carries reference-count\n");
    }
}
