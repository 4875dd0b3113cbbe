use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{PilotError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: String,
    pub model: String,
    pub save_artifacts: bool,
    pub paths: Paths,
    pub prompt: PromptLimits,
    pub gateway: GatewayConfig,
    pub reconcile: ReconcileConfig,
    pub bench: BenchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub scratch_dir: PathBuf,
    pub output_dir: PathBuf,
    pub artifacts_dir: PathBuf,
}

/// Character ceilings applied while assembling the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptLimits {
    pub summary_max_chars: usize,
    pub primary_file_max_chars: usize,
    pub primary_total_max_chars: usize,
    pub ancillary_file_max_chars: usize,
    /// Ancillary files admitted whole before the per-file ceiling kicks in.
    pub ancillary_untruncated_files: usize,
    pub ancillary_total_max_chars: usize,
    pub head_chars: usize,
    pub tail_chars: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    OpenAi,
    Gemini,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::OpenAi => f.write_str("openai"),
            BackendKind::Gemini => f.write_str("gemini"),
        }
    }
}

/// Model identifiers starting with `prefix` go to `backend`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteRule {
    pub prefix: String,
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub openai_url: String,
    pub gemini_url: String,
    pub request_timeout_secs: u64,
    pub max_output_tokens: Option<u32>,
    pub routes: Vec<RouteRule>,
    pub fallback_backend: BackendKind,
    pub fallback_model: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Exact path match only.
    Strict,
    /// Exact match, then final path component.
    Basename,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub policy: MatchPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub workers: usize,
    pub max_prompts: usize,
    pub runs_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: "2025-06-01".into(),
            model: "gemini-1.5-flash-latest".into(),
            save_artifacts: true,
            paths: Paths::default(),
            prompt: PromptLimits::default(),
            gateway: GatewayConfig::default(),
            reconcile: ReconcileConfig::default(),
            bench: BenchConfig::default(),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            scratch_dir: "extracted_xml_original".into(),
            output_dir: "modified_ppts".into(),
            artifacts_dir: ".pptpilot".into(),
        }
    }
}

impl PromptLimits {
    /// Head and tail lengths for a file cut under `ceiling`. Configured values
    /// are shrunk proportionally when together they would not fit below it.
    pub fn head_tail_within(&self, ceiling: usize) -> (usize, usize) {
        let wanted = self.head_chars + self.tail_chars;
        if wanted < ceiling {
            return (self.head_chars, self.tail_chars);
        }
        let room = ceiling.saturating_sub(1);
        let head = room * self.head_chars / wanted;
        (head, (room - head).min(self.tail_chars))
    }
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            summary_max_chars: 150_000,
            primary_file_max_chars: 30_000,
            primary_total_max_chars: 300_000,
            ancillary_file_max_chars: 50_000,
            ancillary_untruncated_files: 5,
            ancillary_total_max_chars: 200_000,
            head_chars: 8_000,
            tail_chars: 2_000,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let rule = |prefix: &str, backend| RouteRule { prefix: prefix.into(), backend };
        Self {
            openai_url: "https://api.openai.com".into(),
            gemini_url: "https://generativelanguage.googleapis.com".into(),
            request_timeout_secs: 300,
            max_output_tokens: None,
            routes: vec![
                rule("gemini", BackendKind::Gemini),
                rule("gpt", BackendKind::OpenAi),
                rule("chatgpt", BackendKind::OpenAi),
                rule("o1", BackendKind::OpenAi),
                rule("o3", BackendKind::OpenAi),
                rule("o4", BackendKind::OpenAi),
            ],
            fallback_backend: BackendKind::Gemini,
            fallback_model: "gemini-1.5-flash-latest".into(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { policy: MatchPolicy::Basename }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self { workers: 4, max_prompts: 55, runs_dir: "benchmark_runs".into() }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else { return Ok(Self::default()) };
        let raw = fs::read_to_string(path).map_err(|e| PilotError::Config(e.to_string()))?;
        toml::from_str(&raw).map_err(|e| PilotError::Config(format!("{}: {e}", path.display())))
    }
}

/// API keys, loaded once and handed to the gateway.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<set>"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl Credentials {
    /// Read `KEY=VALUE` lines from `path`, then fill gaps from the process
    /// environment. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut creds = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|e| PilotError::Config(e.to_string()))?;
            Self::parse(&raw)
        } else {
            tracing::warn!("{} not found; falling back to environment for API keys", path.display());
            Self::default()
        };
        if creds.openai_api_key.is_none() {
            creds.openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty());
        }
        if creds.gemini_api_key.is_none() {
            creds.gemini_api_key = std::env::var("GEMINI_API_KEY").ok().filter(|v| !v.is_empty());
        }
        Ok(creds)
    }

    pub fn parse(raw: &str) -> Self {
        let mut creds = Self::default();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else { continue };
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
            if value.is_empty() {
                continue;
            }
            match key.trim().to_ascii_uppercase().as_str() {
                "OPENAI_API_KEY" => creds.openai_api_key = Some(value),
                "GEMINI_API_KEY" => creds.gemini_api_key = Some(value),
                _ => {}
            }
        }
        creds
    }
}
