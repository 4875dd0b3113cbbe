//! One edit request end to end: extract, prompt, ask, parse, reconcile,
//! rewrite.
//!
//! Stages run strictly in sequence. Package and filesystem failures abort the
//! request; everything model-side degrades to an outcome with zero edits.

use anyhow::Context as _;
use fs_err as fs;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::Config;
use crate::context::{self, summary};
use crate::log;
use crate::package;
use crate::prompt;
use crate::provider::Gateway;
use crate::reconcile;
use crate::reply;
use crate::wire::{EditRequest, MatchKind, PromptStats};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    Modified,
    NoEditsProposed,
    NoEditsResolved,
    GatewayFailed,
}

/// A member that was actually replaced in the output package.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedEdit {
    pub member: String,
    pub declared: String,
    pub matched_by: MatchKind,
    pub before_bytes: usize,
    pub after_bytes: usize,
    #[serde(skip)]
    pub before: String,
    #[serde(skip)]
    pub after: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub tx: Uuid,
    pub status: EditStatus,
    pub model_used: String,
    pub latency_secs: f64,
    pub reply_text: String,
    pub prompt_stats: PromptStats,
    pub applied: Vec<AppliedEdit>,
    pub unresolved: Vec<String>,
    /// Set only when a modified package was written.
    pub output: Option<PathBuf>,
    /// Why nothing was written, when nothing was.
    pub reason: Option<String>,
    pub artifacts: Option<PathBuf>,
}

impl EditOutcome {
    pub fn edit_count(&self) -> usize {
        self.applied.len()
    }

    pub fn is_modified(&self) -> bool {
        self.status == EditStatus::Modified
    }
}

fn file_name(package: &Path) -> String {
    package
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "presentation.pptx".into())
}

impl EditRequest {
    /// Request with output and scratch paths derived from the package name:
    /// `<output_dir>/modified_<name>` and `<scratch_dir>/<name>_xml`.
    pub fn for_package(instruction: impl Into<String>, model: impl Into<String>, package: impl Into<PathBuf>, cfg: &Config) -> Self {
        let package = package.into();
        let name = file_name(&package);
        Self {
            instruction: instruction.into(),
            model: model.into(),
            output: cfg.paths.output_dir.join(format!("modified_{name}")),
            scratch: cfg.paths.scratch_dir.join(format!("{name}_xml")),
            package,
            summary: None,
            images: Vec::new(),
        }
    }
}

pub struct EditPipeline {
    config: Config,
    gateway: Gateway,
}

impl EditPipeline {
    pub fn new(config: Config, gateway: Gateway) -> Self {
        Self { config, gateway }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, req: &EditRequest) -> anyhow::Result<EditOutcome> {
        let tx = Uuid::new_v4();
        tracing::info!(%tx, "editing {} with {}", req.package.display(), req.model);

        // The mirror is a cache of this package only; stale members from an
        // earlier run must not leak into the prompt.
        if req.scratch.exists() {
            fs::remove_dir_all(&req.scratch).context("clearing scratch directory")?;
        }
        let extraction = package::extract_markup(&req.package, &req.scratch)?;
        let member_names = extraction.member_names();
        let members = context::load_members(&extraction.root, &member_names);

        let deck_summary = match &req.summary {
            Some(s) => s.clone(),
            None => summary::summarize(&req.package, &members),
        };
        let originals: HashMap<String, String> =
            members.iter().map(|m| (m.name.clone(), m.content.clone())).collect();

        let prompt_doc = prompt::build_prompt(&req.instruction, &deck_summary, members, &req.images, &self.config.prompt);
        let model_reply = self.gateway.submit(&prompt_doc, &req.model).await;

        let mut saved = if self.config.save_artifacts {
            match log::save_exchange(&self.config.paths.artifacts_dir, tx, &prompt_doc, &model_reply) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("could not save artifacts: {e:#}");
                    None
                }
            }
        } else {
            None
        };

        let mut outcome = EditOutcome {
            tx,
            status: EditStatus::NoEditsProposed,
            model_used: model_reply.model_used.clone(),
            latency_secs: model_reply.latency_secs,
            reply_text: model_reply.text().to_string(),
            prompt_stats: prompt_doc.stats,
            applied: Vec::new(),
            unresolved: Vec::new(),
            output: None,
            reason: None,
            artifacts: saved.as_ref().map(|s| s.dir.clone()),
        };

        let proposed = reply::parse_reply(model_reply.text());
        let reconciled = reconcile::reconcile(proposed.clone(), &member_names, self.config.reconcile.policy);
        outcome.unresolved = reconciled.unresolved;

        if model_reply.is_failed() {
            outcome.status = EditStatus::GatewayFailed;
            outcome.reason = Some(model_reply.text().to_string());
        } else if proposed.is_empty() {
            outcome.reason = Some("The model did not propose any XML modifications.".into());
        } else if reconciled.resolved.is_empty() {
            outcome.status = EditStatus::NoEditsResolved;
            outcome.reason = Some(format!(
                "None of the {} file(s) the model modified match a member of the package: {}",
                outcome.unresolved.len(),
                outcome.unresolved.join(", ")
            ));
        } else {
            let edits: HashMap<String, String> =
                reconciled.resolved.iter().map(|r| (r.member.clone(), r.content.clone())).collect();
            let report = package::rewrite_package(&req.package, &edits, &req.output)?;
            outcome.unresolved.extend(report.unmatched.iter().cloned());

            if report.replaced.is_empty() {
                // An unchanged copy is not a modification.
                fs::remove_file(&req.output).context("removing unmodified output")?;
                outcome.status = EditStatus::NoEditsResolved;
                outcome.reason = Some(format!(
                    "None of the {} resolved file(s) were found when rewriting the package: {}",
                    report.unmatched.len(),
                    report.unmatched.join(", ")
                ));
            } else {
                outcome.applied = reconciled
                    .resolved
                    .into_iter()
                    .filter(|r| report.replaced.contains(&r.member))
                    .map(|r| {
                        let before = originals.get(&r.member).cloned().unwrap_or_default();
                        AppliedEdit {
                            before_bytes: before.len(),
                            after_bytes: r.content.len(),
                            member: r.member,
                            declared: r.declared,
                            matched_by: r.matched_by,
                            before,
                            after: r.content,
                        }
                    })
                    .collect();
                outcome.status = EditStatus::Modified;
                outcome.output = Some(req.output.clone());
            }
        }

        if let Some(reason) = &outcome.reason {
            tracing::info!("no output written: {reason}");
        }
        if let Some(s) = saved.as_mut() {
            if let Err(e) = log::save_outcome(s, &outcome) {
                tracing::warn!("could not save outcome: {e:#}");
            }
        }
        Ok(outcome)
    }
}
