use colored::Colorize;
use humansize::{format_size, DECIMAL};

use crate::bench::BenchSummary;
use crate::package::Extraction;
use crate::pipeline::{AppliedEdit, EditOutcome, EditStatus};
use crate::wire::MatchKind;

const DIFF_MAX_LINES: usize = 40;
const DIFF_MAX_WIDTH: usize = 160;

fn clip(line: &str) -> String {
    if line.chars().count() <= DIFF_MAX_WIDTH {
        return line.to_string();
    }
    let head: String = line.chars().take(DIFF_MAX_WIDTH).collect();
    format!("{head}…")
}

/// Unified diff of one replaced member, colored and capped.
pub fn short_diff(edit: &AppliedEdit) -> String {
    let old: Vec<&str> = edit.before.lines().collect();
    let new: Vec<&str> = edit.after.lines().collect();
    let from = format!("a/{}", edit.member);
    let to = format!("b/{}", edit.member);
    let diff = difflib::unified_diff(&old, &new, &from, &to, "", "", 1);

    let mut out: Vec<String> = Vec::new();
    for line in diff.iter().map(|l| l.trim_end_matches('\n')) {
        if out.len() >= DIFF_MAX_LINES {
            out.push("... (diff truncated)".dimmed().to_string());
            break;
        }
        let line = clip(line);
        let colored = if line.starts_with("+++") || line.starts_with("---") {
            line.bold().to_string()
        } else if line.starts_with('+') {
            line.green().to_string()
        } else if line.starts_with('-') {
            line.red().to_string()
        } else if line.starts_with("@@") {
            line.cyan().to_string()
        } else {
            line
        };
        out.push(colored);
    }
    out.join("\n")
}

pub fn print_outcome(outcome: &EditOutcome) {
    let status = match outcome.status {
        EditStatus::Modified => "MODIFIED".green().bold(),
        EditStatus::NoEditsProposed => "NO EDITS PROPOSED".yellow().bold(),
        EditStatus::NoEditsResolved => "NO EDITS RESOLVED".yellow().bold(),
        EditStatus::GatewayFailed => "MODEL CALL FAILED".red().bold(),
    };

    println!("\n{}", "┏━━━━━━━━━━━━━━━━━━━━━━━━ Edit Result ━━━━━━━━━━━━━━━━━━━━━━━━┓".bold());
    println!(
        "  {}: {}   {}: {}   {}: {:.1}s   {}: {}   {}: {}",
        "Status".bold(),
        status,
        "Model".bold(),
        outcome.model_used,
        "Latency".bold(),
        outcome.latency_secs,
        "Applied".green().bold(),
        outcome.edit_count(),
        "Dropped".red().bold(),
        outcome.unresolved.len()
    );
    let stats = &outcome.prompt_stats;
    if !stats.truncated_files.is_empty() || !stats.skipped_files.is_empty() || stats.summary_digested {
        println!(
            "  {}: {} truncated, {} omitted{}",
            "Prompt".bold(),
            stats.truncated_files.len(),
            stats.skipped_files.len(),
            if stats.summary_digested { ", summary digested" } else { "" }
        );
    }
    println!("{}", "┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛".bold());

    for edit in &outcome.applied {
        let via = match edit.matched_by {
            MatchKind::Exact => String::new(),
            MatchKind::Basename => format!("  (declared as {})", edit.declared).dimmed().to_string(),
        };
        println!(
            "{} {}  ({} -> {}){via}",
            "[REPLACE]".yellow().bold(),
            edit.member,
            format_size(edit.before_bytes, DECIMAL),
            format_size(edit.after_bytes, DECIMAL)
        );
        println!("{}\n", short_diff(edit));
    }
    for name in &outcome.unresolved {
        println!("{} {name}", "[DROPPED]".red().bold());
    }

    match (&outcome.output, &outcome.reason) {
        (Some(out), _) => println!("\nModified presentation: {}", out.display().to_string().bold()),
        (None, Some(reason)) => println!("\n{} {reason}", "No file written:".yellow().bold()),
        (None, None) => {}
    }
    if let Some(dir) = &outcome.artifacts {
        println!("{}", format!("artifacts: {}", dir.display()).dimmed());
    }
}

pub fn print_extraction(extraction: &Extraction) {
    println!("{} {} markup member(s) under {}", "[EXTRACT]".cyan().bold(), extraction.paths.len(), extraction.root.display());
    for name in extraction.member_names() {
        println!("  {name}");
    }
}

pub fn print_bench_summary(summary: &BenchSummary) {
    println!("\n{}", "┏━━━━━━━━━━━━━━━━━━━━━━━ Benchmark Summary ━━━━━━━━━━━━━━━━━━━━━┓".bold());
    println!(
        "  {}: {}   {}: {}   {}: {:.1}%   {}: {}",
        "Attempted".bold(),
        summary.attempted,
        "Succeeded".green().bold(),
        summary.successes,
        "Rate".bold(),
        summary.success_rate * 100.0,
        "Mean time".bold(),
        summary
            .mean_success_time_s
            .map(|t| format!("{t:.1}s"))
            .unwrap_or_else(|| "-".into())
    );
    println!("{}", "┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛".bold());
    println!("results: {}", summary.run_dir.display());
}
