use fs_err as fs;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{normalize_name, open_archive};
use crate::errors::{PilotError, Result};

#[derive(Debug, Clone, Default)]
pub struct RewriteReport {
    pub members: usize,
    pub replaced: Vec<String>,
    /// Edit keys that named no member of the source package.
    pub unmatched: Vec<String>,
}

/// Methods we can write back; anything else is re-encoded as deflate.
fn writable_method(method: CompressionMethod) -> CompressionMethod {
    match method {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    }
}

/// Copy `source` to `output`, swapping in `edits[name]` for matching members.
///
/// Untouched members are raw-copied, so their compressed bytes and headers are
/// carried over as-is. Replaced members keep their name, compression method,
/// timestamp and permissions. The archive is assembled in a temp file next to
/// `output` and persisted only once complete; on any failure the temp file is
/// removed and `output` is left alone.
pub fn rewrite_package(source: &Path, edits: &HashMap<String, String>, output: &Path) -> Result<RewriteReport> {
    let mut archive = open_archive(source)?;

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir().map_err(|e| PilotError::MemberWrite(e.to_string()))?,
    };
    fs::create_dir_all(&parent).map_err(|e| PilotError::MemberWrite(e.to_string()))?;
    let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| PilotError::MemberWrite(e.to_string()))?;
    let write_err = |e: zip::result::ZipError| PilotError::MemberWrite(format!("{}: {e}", output.display()));

    let mut report = RewriteReport { members: archive.len(), ..Default::default() };
    let mut writer = ZipWriter::new(tmp.as_file_mut());

    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| PilotError::PackageRead(format!("{}: entry {i}: {e}", source.display())))?;
        let name = normalize_name(entry.name());

        match edits.get(&name) {
            Some(content) => {
                let mut options = FileOptions::default()
                    .compression_method(writable_method(entry.compression()))
                    .last_modified_time(entry.last_modified());
                if let Some(mode) = entry.unix_mode() {
                    options = options.unix_permissions(mode);
                }
                let original_name = entry.name().to_string();
                drop(entry);

                writer.start_file(original_name, options).map_err(write_err)?;
                writer
                    .write_all(content.as_bytes())
                    .map_err(|e| PilotError::MemberWrite(format!("{name}: {e}")))?;
                report.replaced.push(name);
            }
            None => writer.raw_copy_file(entry).map_err(write_err)?,
        }
    }

    writer.finish().map_err(write_err)?;
    drop(writer);

    report.unmatched = edits
        .keys()
        .filter(|k| !report.replaced.contains(k))
        .cloned()
        .collect();
    report.unmatched.sort();
    for name in &report.unmatched {
        tracing::warn!("edit for {name} matched no member of {}", source.display());
    }

    tmp.persist(output)
        .map_err(|e| PilotError::MemberWrite(format!("{}: {}", output.display(), e.error)))?;
    tracing::info!(
        "wrote {} ({} of {} members replaced)",
        output.display(),
        report.replaced.len(),
        report.members
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::testutil::write_deck;
    use crate::package::{list_members, read_member};
    use pretty_assertions::assert_eq;
    use std::io::Read;

    fn raw_entries(path: &Path) -> Vec<(String, CompressionMethod, Vec<u8>)> {
        let mut archive = open_archive(path).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut e = archive.by_index(i).unwrap();
                let mut buf = Vec::new();
                e.read_to_end(&mut buf).unwrap();
                (e.name().to_string(), e.compression(), buf)
            })
            .collect()
    }

    #[test]
    fn empty_edit_set_preserves_every_member() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        let out = dir.path().join("out/deck.pptx");
        write_deck(&src, 3);

        let report = rewrite_package(&src, &HashMap::new(), &out).unwrap();
        assert!(report.replaced.is_empty());
        assert_eq!(raw_entries(&src), raw_entries(&out));
    }

    #[test]
    fn replaces_only_named_members() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        let out = dir.path().join("modified.pptx");
        write_deck(&src, 3);

        let edits = HashMap::from([("ppt/slides/slide2.xml".to_string(), "<p:sld>new</p:sld>".to_string())]);
        let report = rewrite_package(&src, &edits, &out).unwrap();
        assert_eq!(report.replaced, vec!["ppt/slides/slide2.xml"]);
        assert_eq!(report.members, 8);

        assert_eq!(list_members(&src).unwrap(), list_members(&out).unwrap());
        let before = raw_entries(&src);
        let after = raw_entries(&out);
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.0, a.0);
            assert_eq!(b.1, a.1, "compression kept for {}", a.0);
            if a.0 == "ppt/slides/slide2.xml" {
                assert_eq!(a.2, b"<p:sld>new</p:sld>");
            } else {
                assert_eq!(a.2, b.2, "bytes kept for {}", a.0);
            }
        }
    }

    #[test]
    fn stored_members_stay_stored_when_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        let out = dir.path().join("modified.pptx");
        write_deck(&src, 1);

        let edits = HashMap::from([("ppt/media/image1.png".to_string(), "png?".to_string())]);
        rewrite_package(&src, &edits, &out).unwrap();
        let entry = raw_entries(&out).into_iter().find(|e| e.0 == "ppt/media/image1.png").unwrap();
        assert_eq!(entry.1, CompressionMethod::Stored);
        assert_eq!(read_member(&out, "ppt/media/image1.png").unwrap().as_deref(), Some("png?"));
    }

    #[test]
    fn unmatched_keys_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        let out = dir.path().join("modified.pptx");
        write_deck(&src, 1);

        let edits = HashMap::from([("ppt/slides/slide7.xml".to_string(), "x".to_string())]);
        let report = rewrite_package(&src, &edits, &out).unwrap();
        assert_eq!(report.unmatched, vec!["ppt/slides/slide7.xml"]);
        assert!(report.replaced.is_empty());
    }

    #[test]
    fn unreadable_source_leaves_no_output_behind() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.pptx");
        std::fs::write(&src, b"PK but not really").unwrap();
        let out = dir.path().join("out.pptx");

        let err = rewrite_package(&src, &HashMap::new(), &out).unwrap_err();
        assert!(matches!(err, PilotError::PackageRead(_)));
        assert!(!out.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }
}
