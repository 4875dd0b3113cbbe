use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{encode_image, status_error, GatewayError, Provider};
use crate::config::BackendKind;
use crate::wire::PromptDocument;

const BACKEND: BackendKind = BackendKind::Gemini;

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Gemini `generateContent` backend. Safety filters are relaxed to
/// `BLOCK_NONE` since slide content routinely trips them.
pub struct GeminiProvider {
    base_url: String,
    api_key: Option<String>,
    max_output_tokens: Option<u32>,
    client: Client,
    timeout_secs: u64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

impl GeminiProvider {
    pub fn new(base_url: String, api_key: Option<String>, max_output_tokens: Option<u32>, timeout_secs: u64) -> Self {
        Self { base_url, api_key, max_output_tokens, client: Client::new(), timeout_secs }
    }

    fn body(&self, prompt: &PromptDocument) -> Value {
        let mut parts = vec![json!({ "text": prompt.text })];
        for image in &prompt.attachments {
            if let Some(data) = encode_image(&image.path) {
                parts.push(json!({
                    "inline_data": { "mime_type": image.mime_type, "data": data }
                }));
            }
        }
        let safety: Vec<Value> = HARM_CATEGORIES
            .iter()
            .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
            .collect();

        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "safetySettings": safety,
        });
        if let Some(max) = self.max_output_tokens {
            body["generationConfig"] = json!({ "maxOutputTokens": max });
        }
        body
    }
}

/// Text of the first candidate, or the most specific reason there is none.
fn reply_text(resp: GenerateResponse) -> Result<String, GatewayError> {
    let text: String = resp
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
        .unwrap_or_default();
    if !text.is_empty() {
        return Ok(text);
    }

    if let Some(reason) = resp.prompt_feedback.as_ref().and_then(|f| f.block_reason.clone()) {
        let message = resp
            .prompt_feedback
            .and_then(|f| f.block_reason_message)
            .unwrap_or_else(|| reason.clone());
        return Err(GatewayError::Blocked(BACKEND, format!("{message} (Reason: {reason})")));
    }

    for (i, candidate) in resp.candidates.iter().enumerate() {
        match candidate.finish_reason.as_deref() {
            Some("STOP") => {}
            other => {
                return Err(GatewayError::Incomplete(
                    BACKEND,
                    format!("Candidate {i} did not finish correctly. Reason: {}.", other.unwrap_or("UNSPECIFIED")),
                ))
            }
        }
    }
    Err(GatewayError::EmptyReply(BACKEND))
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn complete(&self, prompt: &PromptDocument, model: &str) -> Result<String, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GatewayError::MissingKey { backend: BACKEND, var: "GEMINI_API_KEY" })?;

        let url = format!("{}/v1beta/models/{model}:generateContent", self.base_url.trim_end_matches('/'));
        tracing::debug!("POST {url} ({} prompt chars, {} image(s))", prompt.text.len(), prompt.attachments.len());

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&self.body(prompt))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(BACKEND, e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| GatewayError::Transport(BACKEND, e.to_string()))?;
        tracing::debug!("gemini status {status}, {} bytes", text.len());

        if !status.is_success() {
            return Err(status_error(BACKEND, status, text));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::Decode(BACKEND, format!("{e}\nRaw: {text}")))?;
        reply_text(parsed)
    }
}
