use fs_err as fs;
use regex::Regex;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::OnceLock;

pub mod summary;

/// One extracted markup member as the prompt builder sees it.
#[derive(Debug, Clone)]
pub struct MemberText {
    /// Internal POSIX path, e.g. `ppt/slides/slide3.xml`.
    pub name: String,
    pub content: String,
}

impl MemberText {
    pub fn chars(&self) -> usize {
        self.content.chars().count()
    }
}

/// Read each extracted member (relative to `root`). Unreadable files are
/// kept with a placeholder body so the model still sees they exist.
pub fn load_members(root: &Path, names: &[String]) -> Vec<MemberText> {
    names
        .iter()
        .map(|name| {
            let content = match fs::read(root.join(name)) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    tracing::warn!("could not read extracted member {name}: {e}");
                    format!("Error reading file: {name}")
                }
            };
            MemberText { name: name.clone(), content }
        })
        .collect()
}

fn slide_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|/)slide(\d+)\.xml$").expect("slide pattern is valid"))
}

/// `Some(Some(n))` for a per-slide member with index `n`, `Some(None)` for a
/// per-slide member whose index does not fit, `None` for everything else.
pub fn slide_index(name: &str) -> Option<Option<u32>> {
    slide_pattern().captures(name).map(|c| c[1].parse().ok())
}

pub fn is_primary(name: &str) -> bool {
    slide_index(name).is_some()
}

/// Split into (per-slide members ordered by index, everything else in
/// original order). Unparsable indices sort after all numbered slides.
pub fn partition(members: Vec<MemberText>) -> (Vec<MemberText>, Vec<MemberText>) {
    let (mut primary, ancillary): (Vec<_>, Vec<_>) = members.into_iter().partition(|m| is_primary(&m.name));
    primary.sort_by(|a, b| match (slide_index(&a.name).flatten(), slide_index(&b.name).flatten()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    (primary, ancillary)
}

/// Keep the first `head` and last `tail` characters of `text`, marking what was
/// cut. Returns `None` when nothing needs cutting.
pub fn head_tail(text: &str, head: usize, tail: usize) -> Option<String> {
    let total = text.chars().count();
    if total <= head + tail {
        return None;
    }
    let head_end = text.char_indices().nth(head).map(|(i, _)| i).unwrap_or(text.len());
    let tail_start = text.char_indices().nth(total - tail).map(|(i, _)| i).unwrap_or(text.len());
    let omitted = total - head - tail;
    Some(format!(
        "{}\n[... {omitted} characters omitted ...]\n{}",
        &text[..head_end],
        &text[tail_start..]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn member(name: &str) -> MemberText {
        MemberText { name: name.into(), content: String::new() }
    }

    #[test]
    fn recognizes_per_slide_members() {
        assert_eq!(slide_index("ppt/slides/slide12.xml"), Some(Some(12)));
        assert_eq!(slide_index("slide3.xml"), Some(Some(3)));
        assert_eq!(slide_index("ppt/slides/slide99999999999.xml"), Some(None));
        assert_eq!(slide_index("ppt/slideLayouts/slideLayout1.xml"), None);
        assert_eq!(slide_index("ppt/notesSlides/notesSlide1.xml"), None);
        assert_eq!(slide_index("ppt/slides/_rels/slide1.xml.rels"), None);
    }

    #[test]
    fn partitions_and_orders_numerically() {
        let members = vec![
            member("[Content_Types].xml"),
            member("ppt/slides/slide10.xml"),
            member("ppt/slides/slide99999999999.xml"),
            member("ppt/theme/theme1.xml"),
            member("ppt/slides/slide2.xml"),
        ];
        let (primary, ancillary) = partition(members);
        let names = |v: &[MemberText]| v.iter().map(|m| m.name.clone()).collect::<Vec<_>>();
        assert_eq!(
            names(&primary),
            vec!["ppt/slides/slide2.xml", "ppt/slides/slide10.xml", "ppt/slides/slide99999999999.xml"]
        );
        assert_eq!(names(&ancillary), vec!["[Content_Types].xml", "ppt/theme/theme1.xml"]);
    }

    #[test]
    fn head_tail_keeps_both_ends() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let cut = head_tail(text, 3, 2).unwrap();
        assert!(cut.starts_with("abc\n"));
        assert!(cut.ends_with("\nyz"));
        assert!(cut.contains("[... 21 characters omitted ...]"));
        assert_eq!(head_tail(text, 20, 6), None);
    }

    #[test]
    fn head_tail_respects_char_boundaries() {
        let text = "ééééé-ééééé";
        let cut = head_tail(text, 2, 2).unwrap();
        assert!(cut.starts_with("éé\n"));
        assert!(cut.ends_with("\néé"));
    }

    #[test]
    fn unreadable_members_get_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.xml"), "<a/>").unwrap();
        let loaded = load_members(dir.path(), &["a.xml".into(), "missing.xml".into()]);
        assert_eq!(loaded[0].content, "<a/>");
        assert_eq!(loaded[1].content, "Error reading file: missing.xml");
    }
}
