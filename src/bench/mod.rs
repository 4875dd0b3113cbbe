//! Batch runner: one pipeline per corpus entry, a bounded number in flight,
//! results streamed to `results.jsonl` as they finish.

use anyhow::Context as _;
use chrono::Local;
use fs_err as fs;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::errors::{PilotError, Result};
use crate::pipeline::EditPipeline;
use crate::wire::EditRequest;

const PLACEHOLDER: &str = "{slide_num}";

#[derive(Debug, Clone)]
pub struct BenchOptions {
    pub corpus: PathBuf,
    pub decks: PathBuf,
    pub model: String,
    pub workers: usize,
    pub max_prompts: usize,
    pub runs_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorpusItem {
    pub id: String,
    pub instruction: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchRecord {
    pub id: String,
    pub instruction: String,
    pub success: bool,
    pub error_message: String,
    pub processing_time_s: Option<f64>,
    /// Relative to the run directory.
    pub before_ppt_path: String,
    pub output_pptx_path: String,
    pub modified_xml_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchSummary {
    pub model: String,
    pub run_dir: PathBuf,
    pub attempted: usize,
    pub successes: usize,
    pub success_rate: f64,
    pub mean_success_time_s: Option<f64>,
}

/// Drop the `{slide_num}` placeholder and tidy the whitespace around it.
pub fn strip_placeholder(instruction: &str) -> String {
    instruction.replace(PLACEHOLDER, " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `12-3` uses `slide_12.pptx`.
pub fn deck_for_id(decks: &Path, id: &str) -> PathBuf {
    let base = id.split('-').next().unwrap_or(id);
    decks.join(format!("slide_{base}.pptx"))
}

/// Read a `{id: instruction}` object, keeping file order, first `max` entries.
pub fn load_corpus(path: &Path, max: usize) -> Result<Vec<CorpusItem>> {
    let raw = fs::read_to_string(path).map_err(|e| PilotError::Corpus(e.to_string()))?;
    let value: Value =
        serde_json::from_str(&raw).map_err(|e| PilotError::Corpus(format!("{}: {e}", path.display())))?;
    let Value::Object(map) = value else {
        return Err(PilotError::Corpus(format!("{}: expected an object of id -> instruction", path.display())));
    };
    map.into_iter()
        .take(max)
        .map(|(id, v)| match v {
            Value::String(s) => Ok(CorpusItem { instruction: strip_placeholder(&s), id }),
            other => Err(PilotError::Corpus(format!("entry {id}: instruction must be a string, got {other}"))),
        })
        .collect()
}

pub fn summarize(records: &[BenchRecord], model: &str, run_dir: &Path) -> BenchSummary {
    let times: Vec<f64> = records
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.processing_time_s)
        .collect();
    let successes = records.iter().filter(|r| r.success).count();
    BenchSummary {
        model: model.to_string(),
        run_dir: run_dir.to_path_buf(),
        attempted: records.len(),
        successes,
        success_rate: if records.is_empty() { 0.0 } else { successes as f64 / records.len() as f64 },
        mean_success_time_s: if times.is_empty() { None } else { Some(times.iter().sum::<f64>() / times.len() as f64) },
    }
}

fn relative(path: &Path, run_dir: &Path) -> String {
    path.strip_prefix(run_dir).unwrap_or(path).display().to_string()
}

async fn run_item(pipeline: &EditPipeline, opts: &BenchOptions, run_dir: &Path, item: &CorpusItem) -> BenchRecord {
    let mut record = BenchRecord {
        id: item.id.clone(),
        instruction: item.instruction.clone(),
        success: false,
        error_message: String::new(),
        processing_time_s: None,
        before_ppt_path: String::new(),
        output_pptx_path: String::new(),
        modified_xml_files: Vec::new(),
    };

    let deck = deck_for_id(&opts.decks, &item.id);
    if !deck.exists() {
        record.error_message = format!("Skipping: Cannot find 'before' PPTX at {}", deck.display());
        return record;
    }

    let item_dir = run_dir.join(&item.id);
    let before = item_dir.join("before.pptx");
    if let Err(e) = fs::create_dir_all(&item_dir).and_then(|_| fs::copy(&deck, &before)) {
        record.error_message = e.to_string();
        return record;
    }
    record.before_ppt_path = relative(&before, run_dir);

    let req = EditRequest {
        instruction: item.instruction.clone(),
        model: opts.model.clone(),
        package: before,
        summary: None,
        images: Vec::new(),
        output: item_dir.join("after.pptx"),
        scratch: item_dir.join("xml"),
    };

    let started = Instant::now();
    let result = pipeline.run(&req).await;
    record.processing_time_s = Some(started.elapsed().as_secs_f64());

    match result {
        Ok(outcome) => {
            record.modified_xml_files = outcome.applied.iter().map(|a| a.member.clone()).collect();
            match &outcome.output {
                Some(out) => {
                    record.success = true;
                    record.output_pptx_path = relative(out, run_dir);
                }
                None => record.error_message = outcome.reason.clone().unwrap_or_default(),
            }
        }
        Err(e) => record.error_message = format!("{e:#}"),
    }
    record
}

fn append_record(path: &Path, record: &BenchRecord) -> anyhow::Result<()> {
    let mut f = fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{}", serde_json::to_string(record)?)?;
    Ok(())
}

/// Run the whole corpus and return the records (in corpus order) and summary.
pub async fn run(pipeline: &EditPipeline, opts: &BenchOptions) -> anyhow::Result<(Vec<BenchRecord>, BenchSummary)> {
    let items = load_corpus(&opts.corpus, opts.max_prompts)?;
    let run_dir = opts.runs_dir.join(format!("run_{}", Local::now().format("%Y%m%d_%H%M%S")));
    fs::create_dir_all(&run_dir).context("creating run directory")?;
    let results_path = run_dir.join("results.jsonl");
    fs::write(&results_path, "")?;

    tracing::info!(
        "benchmark: {} prompt(s), {} worker(s), model {}, output {}",
        items.len(),
        opts.workers,
        opts.model,
        run_dir.display()
    );

    let bar = ProgressBar::new(items.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let workers = opts.workers.max(1);
    let mut pending = stream::iter(items.iter().enumerate())
        .map(|(i, item)| {
            let run_dir = &run_dir;
            async move { (i, run_item(pipeline, opts, run_dir, item).await) }
        })
        .buffer_unordered(workers);

    let mut indexed: Vec<(usize, BenchRecord)> = Vec::with_capacity(items.len());
    while let Some((i, record)) = pending.next().await {
        if let Err(e) = append_record(&results_path, &record) {
            tracing::warn!("could not append result for {}: {e:#}", record.id);
        }
        bar.set_message(format!("{} {}", record.id, if record.success { "ok" } else { "failed" }));
        bar.inc(1);
        indexed.push((i, record));
    }
    bar.finish_and_clear();

    indexed.sort_by_key(|(i, _)| *i);
    let records: Vec<BenchRecord> = indexed.into_iter().map(|(_, r)| r).collect();
    let summary = summarize(&records, &opts.model, &run_dir);
    fs::write(run_dir.join("summary.json"), serde_json::to_string_pretty(&summary)?)?;
    Ok((records, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, Config};
    use crate::package::testutil::{slide_xml, write_deck};
    use crate::provider::{Gateway, GatewayError, Provider, Registry};
    use crate::wire::PromptDocument;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn placeholder_is_removed_cleanly() {
        assert_eq!(strip_placeholder("Make slide {slide_num} title red"), "Make slide title red");
        assert_eq!(strip_placeholder("{slide_num}: add a chart "), ": add a chart");
        assert_eq!(strip_placeholder("plain"), "plain");
    }

    #[test]
    fn deck_uses_id_prefix() {
        assert_eq!(deck_for_id(Path::new("/d"), "12-3"), PathBuf::from("/d/slide_12.pptx"));
        assert_eq!(deck_for_id(Path::new("/d"), "7"), PathBuf::from("/d/slide_7.pptx"));
    }

    #[test]
    fn corpus_keeps_order_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("c.json");
        fs::write(&p, r#"{"9-1": "b {slide_num}", "1-1": "a", "2-1": "c"}"#).unwrap();
        let items = load_corpus(&p, 2).unwrap();
        assert_eq!(
            items,
            vec![
                CorpusItem { id: "9-1".into(), instruction: "b".into() },
                CorpusItem { id: "1-1".into(), instruction: "a".into() },
            ]
        );

        fs::write(&p, "[1, 2]").unwrap();
        assert!(matches!(load_corpus(&p, 5), Err(PilotError::Corpus(_))));
    }

    struct EditsSlideOne;

    #[async_trait]
    impl Provider for EditsSlideOne {
        async fn complete(&self, _prompt: &PromptDocument, _model: &str) -> std::result::Result<String, GatewayError> {
            Ok(format!(
                "MODIFIED_XML_FILE: ppt/slides/slide1.xml\n```xml\n{}\n```",
                slide_xml(1).replace("Slide 1 title", "Edited")
            ))
        }
    }

    #[tokio::test]
    async fn runs_corpus_and_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let decks = dir.path().join("decks");
        fs::create_dir_all(&decks).unwrap();
        write_deck(&decks.join("slide_1.pptx"), 2);
        write_deck(&decks.join("slide_2.pptx"), 1);
        let corpus = dir.path().join("corpus.json");
        fs::write(&corpus, r#"{"2-1": "edit {slide_num}", "3-1": "missing deck", "1-1": "edit"}"#).unwrap();

        let mut cfg = Config::default();
        cfg.save_artifacts = false;
        let mut gateway = Gateway::empty(
            Registry::new(vec![], BackendKind::OpenAi, "stub"),
            Duration::from_secs(5),
        );
        gateway.register(BackendKind::OpenAi, Box::new(EditsSlideOne));
        let pipeline = EditPipeline::new(cfg, gateway);

        let opts = BenchOptions {
            corpus,
            decks,
            model: "stub".into(),
            workers: 2,
            max_prompts: 55,
            runs_dir: dir.path().join("runs"),
        };
        let (records, summary) = run(&pipeline, &opts).await.unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2-1", "3-1", "1-1"]);
        assert!(records[0].success);
        assert_eq!(records[0].output_pptx_path, "2-1/after.pptx");
        assert_eq!(records[0].modified_xml_files, vec!["ppt/slides/slide1.xml"]);
        assert!(!records[1].success);
        assert!(records[1].error_message.contains("Cannot find"));
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.successes, 2);

        let lines = fs::read_to_string(summary.run_dir.join("results.jsonl")).unwrap();
        assert_eq!(lines.lines().count(), 3);
        assert!(summary.run_dir.join("summary.json").is_file());
        assert!(summary.run_dir.join("2-1/before.pptx").is_file());
    }

    #[test]
    fn summary_averages_successes_only() {
        let rec = |success, t| BenchRecord {
            id: "x".into(),
            instruction: String::new(),
            success,
            error_message: String::new(),
            processing_time_s: Some(t),
            before_ppt_path: String::new(),
            output_pptx_path: String::new(),
            modified_xml_files: vec![],
        };
        let s = summarize(&[rec(true, 2.0), rec(true, 4.0), rec(false, 100.0)], "m", Path::new("/r"));
        assert_eq!(s.successes, 2);
        assert_eq!(s.mean_success_time_s, Some(3.0));
        assert!((s.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }
}
