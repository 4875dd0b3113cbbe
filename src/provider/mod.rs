use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::{BackendKind, Credentials, GatewayConfig, RouteRule};
use crate::wire::{GatewayOutcome, ModelReply, PromptDocument};

pub mod gemini;
pub mod openai;

/// Everything that can go wrong talking to a model API. Never escapes the
/// gateway: [`Gateway::submit`] turns it into [`GatewayOutcome::Failed`].
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{backend} API key not found (set {var} in the credentials file or environment)")]
    MissingKey { backend: BackendKind, var: &'static str },
    #[error("{0} API authentication error: {1} (check your API key)")]
    Auth(BackendKind, String),
    #[error("{0} API rate limit error: {1}")]
    RateLimit(BackendKind, String),
    #[error("{0} API bad request: {1}. The prompt or image data might be too long or invalid.")]
    BadRequest(BackendKind, String),
    #[error("{0} API call blocked by safety filter: {1}")]
    Blocked(BackendKind, String),
    #[error("{0} API reply incomplete: {1}")]
    Incomplete(BackendKind, String),
    #[error("{0} API returned no text content")]
    EmptyReply(BackendKind),
    #[error("{0} API error ({1}): {2}")]
    Api(BackendKind, u16, String),
    #[error("{0} API connection error: {1}")]
    Transport(BackendKind, String),
    #[error("{0} API response could not be decoded: {1}")]
    Decode(BackendKind, String),
    #[error("model call timed out after {0}s")]
    Timeout(u64),
}

/// One LLM family: submit a prompt, get reply text.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(&self, prompt: &PromptDocument, model: &str) -> Result<String, GatewayError>;
}

pub type DynProvider = Box<dyn Provider + Send + Sync>;

/// Where a model identifier is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub backend: BackendKind,
    pub model: String,
    pub fallback: bool,
}

/// Prefix table from model identifier to backend, with an explicit fallback
/// for identifiers no rule claims.
#[derive(Debug, Clone)]
pub struct Registry {
    rules: Vec<RouteRule>,
    fallback_backend: BackendKind,
    fallback_model: String,
}

impl Registry {
    pub fn new(rules: Vec<RouteRule>, fallback_backend: BackendKind, fallback_model: impl Into<String>) -> Self {
        Self { rules, fallback_backend, fallback_model: fallback_model.into() }
    }

    pub fn from_config(cfg: &GatewayConfig) -> Self {
        Self::new(cfg.routes.clone(), cfg.fallback_backend, cfg.fallback_model.clone())
    }

    /// Longest matching prefix wins. Unclaimed identifiers go to the fallback
    /// backend with the fallback model, and that substitution is logged.
    pub fn resolve(&self, model_id: &str) -> Route {
        let hit = self
            .rules
            .iter()
            .filter(|r| model_id.starts_with(r.prefix.as_str()))
            .max_by_key(|r| r.prefix.len());
        match hit {
            Some(rule) => Route { backend: rule.backend, model: model_id.to_string(), fallback: false },
            None => {
                tracing::warn!(
                    "model '{model_id}' matches no route; falling back to {} ({})",
                    self.fallback_model,
                    self.fallback_backend
                );
                Route { backend: self.fallback_backend, model: self.fallback_model.clone(), fallback: true }
            }
        }
    }
}

/// Dispatches prompts to the backend a model identifier routes to.
pub struct Gateway {
    registry: Registry,
    backends: HashMap<BackendKind, DynProvider>,
    timeout: Duration,
}

impl Gateway {
    /// Gateway over the real OpenAI and Gemini backends.
    pub fn new(cfg: &GatewayConfig, credentials: &Credentials) -> Self {
        let mut gw = Self::empty(Registry::from_config(cfg), Duration::from_secs(cfg.request_timeout_secs));
        gw.register(
            BackendKind::OpenAi,
            Box::new(openai::OpenAIProvider::new(
                cfg.openai_url.clone(),
                credentials.openai_api_key.clone(),
                cfg.max_output_tokens,
                cfg.request_timeout_secs,
            )),
        );
        gw.register(
            BackendKind::Gemini,
            Box::new(gemini::GeminiProvider::new(
                cfg.gemini_url.clone(),
                credentials.gemini_api_key.clone(),
                cfg.max_output_tokens,
                cfg.request_timeout_secs,
            )),
        );
        gw
    }

    /// Gateway with no backends; see [`Gateway::register`].
    pub fn empty(registry: Registry, timeout: Duration) -> Self {
        Self { registry, backends: HashMap::new(), timeout }
    }

    pub fn register(&mut self, kind: BackendKind, provider: DynProvider) {
        self.backends.insert(kind, provider);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Send `prompt` to the backend `model_id` routes to. Always returns a
    /// reply; failures come back as [`GatewayOutcome::Failed`].
    pub async fn submit(&self, prompt: &PromptDocument, model_id: &str) -> ModelReply {
        let route = self.registry.resolve(model_id);
        let started = Instant::now();

        let result = match self.backends.get(&route.backend) {
            Some(provider) => {
                tracing::info!(
                    "calling {} ({}) with {} image(s)",
                    route.backend,
                    route.model,
                    prompt.attachments.len()
                );
                match tokio::time::timeout(self.timeout, provider.complete(prompt, &route.model)).await {
                    Ok(r) => r,
                    Err(_) => Err(GatewayError::Timeout(self.timeout.as_secs())),
                }
            }
            None => Err(GatewayError::Transport(route.backend, "no backend registered".into())),
        };
        let latency_secs = started.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(text) => {
                tracing::info!("{} replied in {latency_secs:.1}s ({} chars)", route.model, text.len());
                GatewayOutcome::Ok(text)
            }
            Err(e) => {
                tracing::warn!("model call failed after {latency_secs:.1}s: {e}");
                GatewayOutcome::Failed(e.to_string())
            }
        };
        ModelReply { outcome, model_used: route.model, latency_secs }
    }
}

/// Map a non-success HTTP status to the matching error.
pub(crate) fn status_error(backend: BackendKind, status: reqwest::StatusCode, body: String) -> GatewayError {
    match status.as_u16() {
        401 | 403 => GatewayError::Auth(backend, body),
        429 => GatewayError::RateLimit(backend, body),
        400 => GatewayError::BadRequest(backend, body),
        code => GatewayError::Api(backend, code, body),
    }
}

/// Read an attachment and return it base64-encoded, or `None` (logged) if it
/// cannot be read.
pub(crate) fn encode_image(path: &std::path::Path) -> Option<String> {
    use base64::Engine as _;
    match fs_err::read(path) {
        Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        Err(e) => {
            tracing::warn!("skipping image attachment: {e}");
            None
        }
    }
}
