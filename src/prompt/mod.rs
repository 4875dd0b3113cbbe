use serde_json::Value;
use std::path::PathBuf;

use crate::config::PromptLimits;
use crate::context::{head_tail, partition, summary, MemberText};
use crate::wire::{ImageAttachment, PromptDocument, PromptStats};

/// Literal block header the reply parser looks for.
pub const BLOCK_MARKER: &str = "MODIFIED_XML_FILE:";

fn role() -> &'static str {
r#"You are an AI assistant that edits PowerPoint presentations by rewriting the XML members of their .pptx package."#
}

fn output_format() -> &'static str {
r#"OUTPUT FORMAT (MANDATORY):
- For EACH file you change, emit exactly one block of this form and nothing else:
MODIFIED_XML_FILE: <internal/path/of/the/file.xml>
```xml
<the complete new XML content of that file>
```
- Use the VERBATIM internal path shown in the "XML File:" header of the file you are changing (e.g. `ppt/slides/slide1.xml`, never just `slide1.xml`). Only paths from the list of available files are valid.
- Each block must contain the COMPLETE, well-formed XML of the file, not a fragment or a diff. Keep the XML declaration and every namespace declaration of the original.
- Change only the files the request needs. Files you do not emit stay unchanged.
- Do NOT write any explanation, commentary, or other prose before, between, or after the blocks.
- If no file needs to change, reply with the single line: NO_CHANGES

Example of one valid block:
MODIFIED_XML_FILE: ppt/slides/slide1.xml
```xml
<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree>...</p:spTree></p:cSld></p:sld>
```"#
}

fn inputs_description(with_images: bool) -> String {
    let mut s = String::from(
"You are given:
1. The user's natural language request.
2. A JSON summary of the presentation's slides and shapes.
3. The raw XML of the package members: per-slide files first, then themes, layouts, relationships and other parts.",
    );
    if with_images {
        s.push_str("\n4. One rendered image per slide, attached in slide order.");
    }
    s
}

fn task() -> &'static str {
r#"Your task:
1. Understand the user's request.
2. Identify which XML file(s) must change to fulfil it.
3. Produce the complete new XML for each of those files, following the output format below exactly."#
}

/// Accumulates labelled member sections under a cumulative character ceiling.
struct Sections<'a> {
    label: &'static str,
    limits: &'a PromptLimits,
    out: String,
    total: usize,
}

impl<'a> Sections<'a> {
    fn new(label: &'static str, limits: &'a PromptLimits) -> Self {
        Self { label, limits, out: String::new(), total: 0 }
    }

    /// `cut` is `(original chars, head, tail)` for a truncated file.
    fn push(&mut self, name: &str, body: &str, cut: Option<(usize, usize, usize)>) {
        let header = match cut {
            Some((n, head, tail)) => format!(
                "--- XML File: {name} (truncated: {n} characters, showing the first {head} and last {tail}) ---"
            ),
            None => format!("--- XML File: {name} ---"),
        };
        self.out.push_str(&format!("\n\n{header}\n{body}\n--- End of XML File: {name} ---\n"));
        self.total += body.chars().count();
    }

    fn notice(&mut self, skipped: &[String]) {
        self.out.push_str(&format!(
            "\n\n--- Further {} XML content omitted due to overall size limit ({} file(s) not shown: {}) ---\n",
            self.label,
            skipped.len(),
            skipped.join(", ")
        ));
    }

    /// Add `members` in order. `file_max(i)` is the per-file ceiling for
    /// member `i`, if it has one; members over it are cut to head/tail.
    fn fill(
        &mut self,
        members: &[MemberText],
        total_max: usize,
        stats: &mut PromptStats,
        file_max: impl Fn(usize) -> Option<usize>,
    ) {
        for (i, m) in members.iter().enumerate() {
            if self.total >= total_max {
                let skipped: Vec<String> = members[i..].iter().map(|m| m.name.clone()).collect();
                tracing::warn!(
                    "{} XML reached {} characters; leaving out {} file(s)",
                    self.label,
                    self.total,
                    skipped.len()
                );
                self.notice(&skipped);
                stats.skipped_files.extend(skipped);
                return;
            }
            let chars = m.chars();
            let cut = file_max(i).filter(|&ceiling| chars > ceiling).and_then(|ceiling| {
                let (head, tail) = self.limits.head_tail_within(ceiling);
                head_tail(&m.content, head, tail).map(|body| (body, head, tail))
            });
            match cut {
                Some((body, head, tail)) => {
                    tracing::warn!("{} is {chars} characters; sending head and tail only", m.name);
                    stats.truncated_files.push(m.name.clone());
                    self.push(&m.name, &body, Some((chars, head, tail)));
                }
                None => self.push(&m.name, &m.content, None),
            }
        }
    }
}

/// Assemble the prompt for one edit request.
pub fn build_prompt(
    instruction: &str,
    deck_summary: &Value,
    members: Vec<MemberText>,
    images: &[PathBuf],
    limits: &PromptLimits,
) -> PromptDocument {
    let mut stats = PromptStats::default();

    let (summary_text, digested) = summary::render(deck_summary, limits.summary_max_chars);
    stats.summary_chars = summary_text.chars().count();
    stats.summary_digested = digested;

    let all_names: Vec<String> = members.iter().map(|m| m.name.clone()).collect();
    let (primary, ancillary) = partition(members);
    stats.primary_files = primary.len();
    stats.ancillary_files = ancillary.len();

    let mut slides = Sections::new("slide", limits);
    slides.fill(&primary, limits.primary_total_max_chars, &mut stats, |_| Some(limits.primary_file_max_chars));

    let mut others = Sections::new("ancillary", limits);
    others.fill(&ancillary, limits.ancillary_total_max_chars, &mut stats, |i| {
        (i >= limits.ancillary_untruncated_files).then_some(limits.ancillary_file_max_chars)
    });
    stats.markup_chars = slides.total + others.total;

    let attachments: Vec<ImageAttachment> = images
        .iter()
        .enumerate()
        .map(|(i, path)| ImageAttachment {
            slide_index: i + 1,
            path: path.clone(),
            mime_type: mime_guess::from_path(path).first_or_octet_stream().to_string(),
        })
        .collect();

    let file_list = all_names.iter().map(|n| format!(" - {n}")).collect::<Vec<_>>().join("\n");

    let text = format!(
"User's request: {instruction}

{role}

{inputs}

{task}

{output_format}

Available files (internal paths):
{file_list}

Here is the data:

1. JSON Summary of the Presentation:
{summary_text}

2. Raw XML Content (per-slide files):{slides}

3. Raw XML Content (other package members):{others}
",
        role = role(),
        inputs = inputs_description(!attachments.is_empty()),
        task = task(),
        output_format = output_format(),
        slides = if slides.out.is_empty() { "\n(none)".to_string() } else { slides.out },
        others = if others.out.is_empty() { "\n(none)".to_string() } else { others.out },
    );

    tracing::info!(
        "constructed prompt: {} chars (summary {}{}, markup {} across {} slide + {} other files, {} truncated, {} skipped)",
        text.len(),
        stats.summary_chars,
        if stats.summary_digested { " digested" } else { "" },
        stats.markup_chars,
        stats.primary_files,
        stats.ancillary_files,
        stats.truncated_files.len(),
        stats.skipped_files.len()
    );

    PromptDocument { text, attachments, stats }
}
