use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{encode_image, status_error, GatewayError, Provider};
use crate::config::BackendKind;
use crate::wire::PromptDocument;

const BACKEND: BackendKind = BackendKind::OpenAi;

/// Models that accept `image_url` content parts.
fn accepts_images(model: &str) -> bool {
    ["gpt-4o", "gpt-4-turbo", "gpt-4-vision", "gpt-4.1"].iter().any(|p| model.starts_with(p))
}

/// Chat Completions backend. The whole prompt goes out as one user message.
pub struct OpenAIProvider {
    base_url: String,
    api_key: Option<String>,
    max_output_tokens: Option<u32>,
    client: Client,
    timeout_secs: u64,
}

impl OpenAIProvider {
    pub fn new(base_url: String, api_key: Option<String>, max_output_tokens: Option<u32>, timeout_secs: u64) -> Self {
        Self { base_url, api_key, max_output_tokens, client: Client::new(), timeout_secs }
    }

    fn content(&self, prompt: &PromptDocument, model: &str) -> Value {
        if prompt.attachments.is_empty() {
            return Value::String(prompt.text.clone());
        }
        if !accepts_images(model) {
            tracing::warn!(
                "{} image(s) provided but {model} may not accept images; sending text only",
                prompt.attachments.len()
            );
            return Value::String(prompt.text.clone());
        }
        let mut parts = vec![json!({ "type": "text", "text": prompt.text })];
        for image in &prompt.attachments {
            if let Some(data) = encode_image(&image.path) {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": { "url": format!("data:{};base64,{data}", image.mime_type) }
                }));
            }
        }
        Value::Array(parts)
    }
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn complete(&self, prompt: &PromptDocument, model: &str) -> Result<String, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GatewayError::MissingKey { backend: BACKEND, var: "OPENAI_API_KEY" })?;

        let mut body = json!({
            "model": model,
            "messages": [
                { "role": "user", "content": self.content(prompt, model) }
            ],
        });
        if let Some(max) = self.max_output_tokens {
            body["max_tokens"] = json!(max);
        }

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        tracing::debug!("POST {url} ({} prompt chars)", prompt.text.len());

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(BACKEND, e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| GatewayError::Transport(BACKEND, e.to_string()))?;
        tracing::debug!("openai status {status}, {} bytes", text.len());

        if !status.is_success() {
            return Err(status_error(BACKEND, status, text));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::Decode(BACKEND, format!("{e}\nRaw: {text}")))?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(GatewayError::EmptyReply(BACKEND));
        };
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(GatewayError::Blocked(BACKEND, "content_filter".into()));
        }
        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(GatewayError::EmptyReply(BACKEND)),
        }
    }
}
