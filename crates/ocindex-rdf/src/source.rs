//! Input discovery and line streaming over bare files and `.zip` archives.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::RdfError;

/// Lines read from one input, and lines dropped because they were not UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub lines: usize,
    pub skipped: usize,
}

impl std::ops::AddAssign for LineStats {
    fn add_assign(&mut self, other: Self) {
        self.lines += other.lines;
        self.skipped += other.skipped;
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Files under `dir` ending in `ext` or `.zip`, sorted, dotfiles skipped.
///
/// With `recursive == false` only the top level is listed.
pub fn find_inputs(dir: &Path, ext: &str, recursive: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(dir).sort_by_file_name();
    let walker = if recursive { walker } else { walker.max_depth(1) };
    walker
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_zip(p) || name_of(p).to_lowercase().ends_with(ext))
        .collect()
}

/// Call `visit` with every readable member of `path` whose name ends in `ext`.
///
/// A bare file is its own single member. Returns the number of members visited.
pub fn for_each_member(
    path: &Path,
    ext: &str,
    mut visit: impl FnMut(&str, &mut dyn Read) -> Result<(), RdfError>,
) -> Result<usize, RdfError> {
    if !is_zip(path) {
        let mut file = BufReader::new(File::open(path)?);
        visit(&name_of(path), &mut file)?;
        return Ok(1);
    }

    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(path)?))?;
    let mut visited = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() || !entry.name().to_lowercase().ends_with(ext) {
            continue;
        }
        let name = entry.name().to_string();
        tracing::debug!(archive = %path.display(), member = %name, "reading zip member");
        visit(&name, &mut entry)?;
        visited += 1;
    }
    Ok(visited)
}

/// Stream `reader` line by line, without the line terminator.
///
/// Lines that are not valid UTF-8 are skipped.
pub fn read_lines(
    reader: &mut dyn Read,
    origin: &str,
    mut visit: impl FnMut(&str),
) -> Result<LineStats, RdfError> {
    let mut reader = BufReader::new(reader);
    let mut stats = LineStats::default();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        match std::str::from_utf8(&buf) {
            Ok(line) => {
                stats.lines += 1;
                visit(line.trim_end_matches(['\n', '\r']));
            }
            Err(e) => {
                stats.skipped += 1;
                tracing::debug!(origin, error = %e, "skipping undecodable line");
            }
        }
    }
    Ok(stats)
}

/// Stream every line of every `ext` member of `path`.
pub fn for_each_line(
    path: &Path,
    ext: &str,
    mut visit: impl FnMut(&str),
) -> Result<LineStats, RdfError> {
    let mut total = LineStats::default();
    for_each_member(path, ext, |name, reader| {
        total += read_lines(reader, name, &mut visit)?;
        Ok(())
    })?;
    Ok(total)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use super::*;

    /// Write a zip at `path` holding `(name, body)` members.
    pub(crate) fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in members {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn finds_bare_files_and_archives() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.ttl"), "").unwrap();
        std::fs::write(dir.path().join(".hidden.ttl"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        write_zip(&dir.path().join("a.zip"), &[]);
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.TTL"), "").unwrap();

        let names = |paths: Vec<PathBuf>| paths.iter().map(|p| name_of(p)).collect::<Vec<_>>();
        assert_eq!(
            names(find_inputs(dir.path(), ".ttl", true)),
            vec!["a.zip", "b.ttl", "c.TTL"]
        );
        assert_eq!(names(find_inputs(dir.path(), ".ttl", false)), vec!["a.zip", "b.ttl"]);
    }

    #[test]
    fn zip_members_are_filtered_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.zip");
        write_zip(
            &path,
            &[
                ("1.ttl", &b"a\nb\n"[..]),
                ("readme.md", &b"x\n"[..]),
                ("2.ttl", &b"c"[..]),
            ],
        );

        let mut seen = Vec::new();
        let stats = for_each_line(&path, ".ttl", |line| seen.push(line.to_string())).unwrap();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(stats, LineStats { lines: 3, skipped: 0 });
    }

    #[test]
    fn undecodable_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.ttl");
        std::fs::write(&path, b"ok\r\n\xff\xfe\nfine\n").unwrap();

        let mut seen = Vec::new();
        let stats = for_each_line(&path, ".ttl", |line| seen.push(line.to_string())).unwrap();
        assert_eq!(seen, vec!["ok", "fine"]);
        assert_eq!(stats.skipped, 1);
    }
}
