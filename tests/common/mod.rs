#![allow(dead_code)]

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use zip::write::FileOptions;
use zip::CompressionMethod;

use pptpilot::config::{BackendKind, Config};
use pptpilot::pipeline::EditPipeline;
use pptpilot::provider::{Gateway, GatewayError, Provider, Registry};
use pptpilot::wire::PromptDocument;

pub fn slide_xml(n: usize, title: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<p:sld xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\">\
<p:cSld><p:spTree><p:sp><p:nvSpPr><p:cNvPr id=\"{n}\" name=\"Title {n}\"/></p:nvSpPr>\
<p:txBody><a:p><a:r><a:t>{title}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"
    )
}

/// A deck with `slides` slides whose titles are `Slide N`, plus the usual
/// package plumbing and one stored image.
pub fn write_deck(path: &Path, slides: usize) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);

    zip.start_file("[Content_Types].xml", deflated).unwrap();
    zip.write_all(b"<?xml version=\"1.0\"?><Types/>").unwrap();
    zip.start_file("_rels/.rels", deflated).unwrap();
    zip.write_all(b"<?xml version=\"1.0\"?><Relationships/>").unwrap();
    zip.start_file("ppt/presentation.xml", deflated).unwrap();
    zip.write_all(b"<?xml version=\"1.0\"?><p:presentation/>").unwrap();
    for n in 1..=slides {
        zip.start_file(format!("ppt/slides/slide{n}.xml"), deflated).unwrap();
        zip.write_all(slide_xml(n, &format!("Slide {n}")).as_bytes()).unwrap();
        zip.start_file(format!("ppt/slides/_rels/slide{n}.xml.rels"), deflated).unwrap();
        zip.write_all(b"<Relationships/>").unwrap();
    }
    zip.start_file("ppt/theme/theme1.xml", deflated).unwrap();
    zip.write_all(b"<a:theme name=\"Office\"/>").unwrap();
    zip.start_file("ppt/media/image1.png", stored).unwrap();
    zip.write_all(&[0x89, b'P', b'N', b'G', 13, 10, 26, 10]).unwrap();
    zip.finish().unwrap();
}

/// Deck holding exactly `entries`, deflated, names written verbatim.
pub fn write_raw_deck(path: &Path, entries: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, body) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// (name, compression, decompressed bytes) for every member, in order.
pub fn members(path: &Path) -> Vec<(String, CompressionMethod, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut f = archive.by_index(i).unwrap();
            let mut buf = Vec::new();
            f.read_to_end(&mut buf).unwrap();
            (f.name().to_string(), f.compression(), buf)
        })
        .collect()
}

pub fn block(name: &str, content: &str) -> String {
    format!("MODIFIED_XML_FILE: {name}\n```xml\n{content}\n```\n")
}

/// Replies with a fixed text (or error) and remembers the prompts it saw.
#[derive(Clone)]
pub struct Scripted {
    reply: Result<String, String>,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl Scripted {
    pub fn replying(text: impl Into<String>) -> Self {
        Self { reply: Ok(text.into()), seen: Arc::default() }
    }

    pub fn failing(diagnostic: impl Into<String>) -> Self {
        Self { reply: Err(diagnostic.into()), seen: Arc::default() }
    }

    pub fn last_prompt(&self) -> String {
        self.seen.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Provider for Scripted {
    async fn complete(&self, prompt: &PromptDocument, _model: &str) -> Result<String, GatewayError> {
        self.seen.lock().unwrap().push(prompt.text.clone());
        self.reply
            .clone()
            .map_err(|d| GatewayError::Auth(BackendKind::OpenAi, d))
    }
}

/// Pipeline whose every model identifier routes to `provider`. Scratch,
/// output and artifacts live under `root`.
pub fn pipeline(root: &Path, provider: Scripted) -> EditPipeline {
    let mut cfg = Config::default();
    cfg.paths.scratch_dir = root.join("scratch");
    cfg.paths.output_dir = root.join("out");
    cfg.paths.artifacts_dir = root.join("artifacts");

    let mut gateway = Gateway::empty(
        Registry::new(vec![], BackendKind::OpenAi, "scripted"),
        std::time::Duration::from_secs(5),
    );
    gateway.register(BackendKind::OpenAi, Box::new(provider));
    EditPipeline::new(cfg, gateway)
}
