//! Zip-based presentation packages: listing, markup extraction and single
//! member reads. Packages are never mutated; see [`rewrite`] for producing a
//! modified copy.

use fs_err as fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::errors::{PilotError, Result};

pub mod rewrite;

pub use rewrite::{rewrite_package, RewriteReport};

/// Member suffixes that take part in extraction and replacement.
pub const MARKUP_SUFFIXES: [&str; 2] = [".xml", ".rels"];

pub fn is_markup(name: &str) -> bool {
    MARKUP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Backslashes to forward slashes, the way member names are compared.
pub fn normalize_name(name: &str) -> String {
    name.replace('\\', "/")
}

/// Result of [`extract_markup`]: the destination root and every file written,
/// in archive order, next to the member name it came from.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub root: PathBuf,
    pub paths: Vec<PathBuf>,
    names: Vec<String>,
}

impl Extraction {
    /// Archive member names (backslashes normalized), parallel to `paths`.
    /// These are the names the rewriter matches on, so `./` prefixes and
    /// doubled slashes survive even though the disk paths drop them.
    pub fn member_names(&self) -> Vec<String> {
        self.names.clone()
    }
}

pub(crate) fn open_archive(package: &Path) -> Result<ZipArchive<fs::File>> {
    let file = fs::File::open(package).map_err(|e| PilotError::PackageRead(e.to_string()))?;
    ZipArchive::new(file)
        .map_err(|e| PilotError::PackageRead(format!("{}: {e}", package.display())))
}

/// Write every markup member of `package` under `dest`, mirroring internal
/// paths. Existing files are overwritten; nothing is cleared first.
pub fn extract_markup(package: &Path, dest: &Path) -> Result<Extraction> {
    let mut archive = open_archive(package)?;
    fs::create_dir_all(dest).map_err(|e| PilotError::MemberWrite(e.to_string()))?;

    let mut paths = Vec::new();
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| PilotError::PackageRead(format!("{}: entry {i}: {e}", package.display())))?;
        let name = normalize_name(entry.name());
        if entry.is_dir() || !is_markup(&name) {
            continue;
        }
        let Some(rel) = entry.enclosed_name().map(Path::to_path_buf) else {
            tracing::warn!("skipping member with unsafe path: {}", entry.name());
            continue;
        };

        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| PilotError::MemberWrite(e.to_string()))?;
        }
        let mut out = fs::File::create(&target).map_err(|e| PilotError::MemberWrite(e.to_string()))?;
        io::copy(&mut entry, &mut out).map_err(|e| {
            PilotError::MemberWrite(format!("{} -> {}: {e}", entry.name(), target.display()))
        })?;
        paths.push(target);
        names.push(name);
    }

    tracing::debug!("extracted {} markup members from {}", paths.len(), package.display());
    Ok(Extraction { root: dest.to_path_buf(), paths, names })
}

/// Every member name in archive order, directories included.
pub fn list_members(package: &Path) -> Result<Vec<String>> {
    let mut archive = open_archive(package)?;
    (0..archive.len())
        .map(|i| {
            archive
                .by_index_raw(i)
                .map(|e| e.name().to_string())
                .map_err(|e| PilotError::PackageRead(format!("{}: entry {i}: {e}", package.display())))
        })
        .collect()
}

/// Text of one member, or `None` if the package has no such entry.
pub fn read_member(package: &Path, name: &str) -> Result<Option<String>> {
    let mut archive = open_archive(package)?;
    let wanted = normalize_name(name);
    let index = (0..archive.len()).find(|&i| {
        archive
            .by_index_raw(i)
            .map(|e| normalize_name(e.name()) == wanted)
            .unwrap_or(false)
    });
    let Some(index) = index else { return Ok(None) };

    let mut entry = archive
        .by_index(index)
        .map_err(|e| PilotError::PackageRead(format!("{wanted}: {e}")))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| PilotError::PackageRead(format!("{wanted}: {e}")))?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}
