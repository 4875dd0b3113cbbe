use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// ========================================
/// Edit request/reply data model
/// ========================================

/// One user action against one source package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRequest {
    pub instruction: String,
    pub model: String,
    pub package: PathBuf,
    /// Caller-supplied deck summary; built from the package when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    /// Slide images, in slide order.
    #[serde(default)]
    pub images: Vec<PathBuf>,
    /// Where the modified package is written.
    pub output: PathBuf,
    /// Scratch mirror of the extracted markup members.
    pub scratch: PathBuf,
}

/// A slide image handed to the model alongside the prompt text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageAttachment {
    pub slide_index: usize,
    pub path: PathBuf,
    pub mime_type: String,
}

/// Bookkeeping about what the prompt builder had to cut.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptStats {
    pub summary_chars: usize,
    pub summary_digested: bool,
    pub primary_files: usize,
    pub ancillary_files: usize,
    pub markup_chars: usize,
    pub truncated_files: Vec<String>,
    pub skipped_files: Vec<String>,
}

/// The text (and images) sent to the model for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDocument {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<ImageAttachment>,
    #[serde(default)]
    pub stats: PromptStats,
}

impl PromptDocument {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self { text: text.into(), attachments: Vec::new(), stats: PromptStats::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum GatewayOutcome {
    Ok(String),
    Failed(String),
}

/// What came back from the model gateway. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReply {
    pub outcome: GatewayOutcome,
    pub model_used: String,
    pub latency_secs: f64,
}

impl ModelReply {
    /// Reply text as shown to a user; diagnostics included.
    pub fn text(&self) -> &str {
        match &self.outcome {
            GatewayOutcome::Ok(t) | GatewayOutcome::Failed(t) => t,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, GatewayOutcome::Failed(_))
    }
}

/// A block the model asked for. `declared` is untrusted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedEdit {
    pub declared: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Basename,
}

/// A proposed edit bound to a real member name. Only these are applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedEdit {
    pub member: String,
    pub declared: String,
    pub matched_by: MatchKind,
    pub content: String,
}
