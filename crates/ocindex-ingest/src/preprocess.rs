//! Uniform access to the members of an input dump.
//!
//! An input is a directory, a `.tar.gz`, a `.zip` or a `.zst` file. Zip and
//! zstd inputs are decompressed once into a sibling directory that later
//! runs reuse; tar.gz members stay in the archive and are read on demand.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use walkdir::WalkDir;

use crate::IngestError;

/// One input file, on disk or inside a tar.gz archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    File(PathBuf),
    Tar { archive: PathBuf, name: String },
}

impl Member {
    /// The member's file name, used for extension checks and logging.
    pub fn file_name(&self) -> String {
        match self {
            Member::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Member::Tar { name, .. } => name.rsplit('/').next().unwrap_or(name).to_string(),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::File(path) => write!(f, "{}", path.display()),
            Member::Tar { archive, name } => write!(f, "{}!{}", archive.display(), name),
        }
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn wanted(name: &str, ext: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    !is_hidden(base) && !name.contains("__MACOSX") && base.ends_with(ext)
}

/// An open `.tar.gz` input whose members are decompressed on demand.
#[derive(Debug, Clone)]
pub struct TarHandle {
    path: PathBuf,
}

impl TarHandle {
    /// Open `path` and list the members ending in `ext`.
    pub fn open(path: &Path, ext: &str) -> Result<(Self, Vec<Member>), IngestError> {
        let handle = Self {
            path: path.to_path_buf(),
        };
        let mut members = Vec::new();
        let mut archive = handle.archive()?;
        for entry in archive.entries()? {
            let entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path()?.to_string_lossy().into_owned();
            if wanted(&name, ext) {
                members.push(Member::Tar {
                    archive: handle.path.clone(),
                    name,
                });
            }
        }
        Ok((handle, members))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn archive(&self) -> Result<Archive<GzDecoder<BufReader<File>>>, IngestError> {
        let file = File::open(&self.path)?;
        Ok(Archive::new(GzDecoder::new(BufReader::new(file))))
    }

    /// Decompress the member called `name`.
    pub fn extract(&self, name: &str) -> Result<Vec<u8>, IngestError> {
        let mut archive = self.archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()?.to_string_lossy() == name {
                let mut buf = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut buf)?;
                return Ok(buf);
            }
        }
        Err(IngestError::MalformedInputFile {
            path: self.path.clone(),
            reason: format!("no member named {}", name),
        })
    }

    /// Stream every member ending in `ext`, in archive order, in one pass.
    ///
    /// `visit` returns `false` to stop early.
    pub fn for_each(
        &self,
        ext: &str,
        mut visit: impl FnMut(Member, Vec<u8>) -> bool,
    ) -> Result<(), IngestError> {
        let mut archive = self.archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path()?.to_string_lossy().into_owned();
            if !wanted(&name, ext) {
                continue;
            }
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            let member = Member::Tar {
                archive: self.path.clone(),
                name,
            };
            if !visit(member, buf) {
                break;
            }
        }
        Ok(())
    }
}

/// Files under `dir` ending in `ext`, skipping dotfiles, sorted by path.
fn walk(dir: &Path, ext: &str) -> Vec<Member> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| wanted(&e.file_name().to_string_lossy(), ext))
        .map(|e| Member::File(e.into_path()))
        .collect()
}

fn lower_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Sibling directory `{stem}_{suffix}` next to `input`, where `stem` is the
/// file name up to its first dot.
fn sibling_dir(input: &Path, suffix: &str) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.split('.').next().unwrap_or(&name);
    input
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{}_{}", stem, suffix))
}

/// Extract a zip archive into `dest`, skipping path traversal attempts and
/// macOS resource forks.
fn unzip_into(input: &Path, dest: &Path) -> Result<(), IngestError> {
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(input)?))?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(name) = file.enclosed_name() else {
            continue;
        };
        if name.to_string_lossy().contains("__MACOSX") {
            continue;
        }
        let out = dest.join(name);
        if file.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = File::create(&out)?;
        std::io::copy(&mut file, &mut writer)?;
    }
    Ok(())
}

/// Decompress a zip into its sibling directory unless that already exists.
fn decompress_zip(input: &Path) -> Result<PathBuf, IngestError> {
    let dest = sibling_dir(input, "decompr_zip_dir");
    if dest.is_dir() {
        tracing::debug!(path = %dest.display(), "reusing decompressed zip");
        return Ok(dest);
    }
    let partial = dest.with_extension("part");
    if partial.exists() {
        std::fs::remove_dir_all(&partial)?;
    }
    std::fs::create_dir_all(&partial)?;
    unzip_into(input, &partial)?;
    std::fs::rename(&partial, &dest)?;
    tracing::info!(input = %input.display(), path = %dest.display(), "decompressed zip");
    Ok(dest)
}

/// Stream-decompress a zstd file into its sibling directory unless the
/// output already exists.
fn decompress_zst(input: &Path) -> Result<PathBuf, IngestError> {
    let dest = sibling_dir(input, "decompr_zst_dir");
    std::fs::create_dir_all(&dest)?;
    let out_name = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "decompressed".into());
    let out = dest.join(out_name);
    if out.exists() {
        tracing::debug!(path = %out.display(), "reusing decompressed zst");
        return Ok(dest);
    }
    let partial = out.with_extension("part");
    {
        let reader = BufReader::new(File::open(input)?);
        let mut writer = File::create(&partial)?;
        zstd::stream::copy_decode(reader, &mut writer)?;
    }
    std::fs::rename(&partial, &out)?;
    tracing::info!(input = %input.display(), path = %out.display(), "decompressed zst");
    Ok(dest)
}

/// Enumerate the members of `input` whose names end in `ext`.
///
/// The tar handle is `Some` only for `.tar.gz` inputs; pass it back to
/// [`read_member`] or [`load_json`] to decompress a member.
pub fn get_all_files(
    input: &Path,
    ext: &str,
) -> Result<(Vec<Member>, Option<TarHandle>), IngestError> {
    if input.is_dir() {
        return Ok((walk(input, ext), None));
    }
    if !input.is_file() {
        return Err(IngestError::UnsupportedInput(input.to_path_buf()));
    }

    let name = lower_name(input);
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let (handle, members) = TarHandle::open(input, ext)?;
        Ok((members, Some(handle)))
    } else if name.ends_with(".zip") {
        Ok((walk(&decompress_zip(input)?, ext), None))
    } else if name.ends_with(".zst") {
        Ok((walk(&decompress_zst(input)?, ext), None))
    } else if name.ends_with(ext) {
        Ok((vec![Member::File(input.to_path_buf())], None))
    } else {
        Err(IngestError::UnsupportedInput(input.to_path_buf()))
    }
}

/// Raw bytes of a member.
pub fn read_member(member: &Member, handle: Option<&TarHandle>) -> Result<Vec<u8>, IngestError> {
    match member {
        Member::File(path) => Ok(std::fs::read(path)?),
        Member::Tar { archive, name } => match handle {
            Some(h) => h.extract(name),
            None => TarHandle {
                path: archive.clone(),
            }
            .extract(name),
        },
    }
}

/// Parse a member as JSON, decoding bytes lossily first.
///
/// `index` and `total` are only used for progress logging.
pub fn load_json(
    member: &Member,
    handle: Option<&TarHandle>,
    index: usize,
    total: usize,
) -> Result<serde_json::Value, IngestError> {
    if matches!(member, Member::Tar { .. }) {
        tracing::debug!(index, total, member = %member, "opening file in tar.gz archive");
    } else {
        tracing::trace!(index, total, member = %member, "opening file");
    }
    let bytes = read_member(member, handle)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(serde_json::from_str(&text)?)
}
