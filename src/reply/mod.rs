use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::wire::ProposedEdit;

fn block_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?s)MODIFIED_XML_FILE:\s*(?P<filename>[^\n`]+?)\s*```xml[ \t]*\r?\n(?:(?P<content>.*?)\r?\n)??[ \t]*```",
        )
        .expect("block pattern is valid")
    })
}

/// Backslashes to forward slashes, surrounding whitespace and quotes removed.
pub fn normalize_declared(name: &str) -> String {
    name.trim()
        .replace('\\', "/")
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Extract every `MODIFIED_XML_FILE` block from a model reply.
///
/// Entries keep the order in which a filename first appeared; a later block
/// for the same filename replaces the earlier content. Free text around the
/// blocks is ignored and a reply without blocks yields an empty list. Empty
/// blocks are dropped and never swallow the block after them.
pub fn parse_reply(text: &str) -> Vec<ProposedEdit> {
    let mut edits: Vec<ProposedEdit> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for caps in block_pattern().captures_iter(text) {
        let declared = normalize_declared(&caps["filename"]);
        if declared.is_empty() {
            tracing::warn!("ignoring block with an empty filename");
            continue;
        }
        let content = caps.name("content").map_or("", |c| c.as_str()).trim().to_string();
        if content.is_empty() {
            tracing::warn!("ignoring empty block for {declared}");
            continue;
        }
        match seen.get(&declared) {
            Some(&i) => {
                tracing::warn!("duplicate block for {declared}; keeping the later one");
                edits[i].content = content;
            }
            None => {
                seen.insert(declared.clone(), edits.len());
                edits.push(ProposedEdit { declared, content });
            }
        }
    }

    if edits.is_empty() {
        tracing::info!("no MODIFIED_XML_FILE blocks found in reply");
    } else {
        tracing::debug!(
            "parsed blocks for: {}",
            edits.iter().map(|e| e.declared.as_str()).collect::<Vec<_>>().join(", ")
        );
    }
    edits
}
