use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::OnceLock;

use super::{partition, MemberText};

fn shape_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<p:cNvPr\b[^>]*?\bname="([^"]*)""#).expect("shape name pattern is valid"))
}

fn text_run_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<a:t>(.*?)</a:t>").expect("text run pattern is valid"))
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Shapes of one slide: each `cNvPr` name with the text runs that follow it up
/// to the next shape.
fn shapes(xml: &str) -> Vec<Value> {
    let names: Vec<_> = shape_name_pattern().captures_iter(xml).collect();
    names
        .iter()
        .enumerate()
        .map(|(i, cap)| {
            let start = cap.get(0).map(|m| m.end()).unwrap_or(0);
            let end = names.get(i + 1).and_then(|c| c.get(0)).map(|m| m.start()).unwrap_or(xml.len());
            let text = text_run_pattern()
                .captures_iter(&xml[start..end])
                .map(|t| unescape(&t[1]))
                .collect::<Vec<_>>()
                .join(" ");
            json!({ "name": unescape(&cap[1]), "text": text.trim() })
        })
        .collect()
}

/// Structured summary of a deck built from its extracted slide markup.
pub fn summarize(package: &Path, members: &[MemberText]) -> Value {
    let (slides, _) = partition(members.to_vec());
    let slides: Vec<Value> = slides
        .iter()
        .enumerate()
        .map(|(i, m)| {
            json!({
                "slide_number": i + 1,
                "member": m.name,
                "shapes": shapes(&m.content),
            })
        })
        .collect();
    json!({
        "filename": package.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default(),
        "slides": slides,
    })
}

/// Pretty JSON of `summary`, or a short digest when that exceeds `max_chars`.
/// Returns the text and whether it was digested.
pub fn render(summary: &Value, max_chars: usize) -> (String, bool) {
    let full = serde_json::to_string_pretty(summary).unwrap_or_else(|_| summary.to_string());
    if full.chars().count() <= max_chars {
        return (full, false);
    }

    let slides = summary.get("slides").and_then(Value::as_array);
    let slide_count = slides.map(Vec::len).unwrap_or(0);
    let first_shapes = slides
        .and_then(|s| s.first())
        .and_then(|s| s.get("shapes"))
        .and_then(Value::as_array)
        .map(|s| s.len().to_string())
        .unwrap_or_else(|| "N/A".into());
    tracing::warn!("deck summary is {} characters; sending a digest instead", full.len());
    (
        format!(
            "JSON summary is too large to include fully in this section. \
Total slides: {slide_count}. First slide shapes count: {first_shapes}. \
(Full JSON was prepared but summarized for this prompt view)"
        ),
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::testutil::slide_xml;
    use pretty_assertions::assert_eq;

    #[test]
    fn summarizes_slides_in_index_order() {
        let members = vec![
            MemberText { name: "ppt/slides/slide2.xml".into(), content: slide_xml(2) },
            MemberText { name: "ppt/theme/theme1.xml".into(), content: "<a:theme/>".into() },
            MemberText { name: "ppt/slides/slide1.xml".into(), content: slide_xml(1) },
        ];
        let summary = summarize(Path::new("/tmp/deck.pptx"), &members);
        assert_eq!(summary["filename"], "deck.pptx");
        assert_eq!(summary["slides"].as_array().unwrap().len(), 2);
        assert_eq!(summary["slides"][0]["member"], "ppt/slides/slide1.xml");
        assert_eq!(summary["slides"][1]["shapes"][0], json!({"name": "Title 2", "text": "Slide 2 title"}));
    }

    #[test]
    fn text_runs_attach_to_their_shape() {
        let xml = r#"<p:cNvPr id="1" name="A &amp; B"/><a:t>one</a:t><a:t>two</a:t><p:cNvPr id="2" name="Pic"/>"#;
        assert_eq!(
            shapes(xml),
            vec![json!({"name": "A & B", "text": "one two"}), json!({"name": "Pic", "text": ""})]
        );
    }

    #[test]
    fn oversized_summary_becomes_digest() {
        let summary = json!({
            "filename": "big.pptx",
            "slides": [
                {"slide_number": 1, "shapes": [{"name": "a", "text": "x".repeat(500)}, {"name": "b", "text": ""}]},
                {"slide_number": 2, "shapes": []},
            ]
        });
        let (text, digested) = render(&summary, 100);
        assert!(digested);
        assert!(text.contains("Total slides: 2."));
        assert!(text.contains("First slide shapes count: 2."));

        let (text, digested) = render(&summary, 10_000);
        assert!(!digested);
        assert!(text.contains("\"big.pptx\""));
    }

    #[test]
    fn digest_handles_missing_slides() {
        let (text, digested) = render(&json!({"blob": "y".repeat(50)}), 10);
        assert!(digested);
        assert!(text.contains("Total slides: 0. First slide shapes count: N/A."));
    }
}
