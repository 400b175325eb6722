//! Text-completion backends.
//!
//! Every call is a single blocking request: one user prompt in, one text reply
//! out. Callers that live on an async runtime move turns onto a blocking
//! thread before they get here.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{ConfigError, LlmBackendKind, LlmConfig};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to reach {backend} at {url}: {message}")]
    Network {
        backend: &'static str,
        url: String,
        message: String,
    },
    #[error("{backend} http error {status}: {body}")]
    Http {
        backend: &'static str,
        status: u16,
        body: String,
    },
    #[error("{backend} returned invalid JSON: {message}")]
    InvalidResponse {
        backend: &'static str,
        message: String,
    },
    #[error("{backend}: no text in response")]
    EmptyResponse { backend: &'static str },
}

/// A model that turns a prompt into text.
pub trait ReasoningEngine: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    fn model(&self) -> &str;
}

fn http_client(timeout: Option<Duration>, backend: &'static str) -> Result<reqwest::blocking::Client, LlmError> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| LlmError::Network {
        backend,
        url: String::new(),
        message: format!("failed to build http client: {e}"),
    })
}

fn post_json(
    request: reqwest::blocking::RequestBuilder,
    backend: &'static str,
    url: &str,
    body: &Value,
) -> Result<Value, LlmError> {
    let resp = request.json(body).send().map_err(|e| LlmError::Network {
        backend,
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(LlmError::Http {
            backend,
            status: status.as_u16(),
            body,
        });
    }
    resp.json::<Value>().map_err(|e| LlmError::InvalidResponse {
        backend,
        message: e.to_string(),
    })
}

/// Reasoning-series models reject `temperature` and `max_tokens`.
fn is_reasoning_model(model: &str) -> bool {
    let m = model.trim().to_ascii_lowercase();
    m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4")
}

// =============================================================================
// OpenAI (chat completions)
// =============================================================================

pub struct OpenAiEngine {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
    max_output_tokens: u32,
}

impl OpenAiEngine {
    const BACKEND: &'static str = "openai";

    pub fn new(config: &LlmConfig, model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(config.timeout, Self::BACKEND)?,
            url: format!("{}/v1/chat/completions", config.base_url),
            api_key: config.api_key()?.to_string(),
            model: model.into(),
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if is_reasoning_model(&self.model) {
            body["max_completion_tokens"] = json!(self.max_output_tokens);
        } else {
            body["temperature"] = json!(0);
            body["max_tokens"] = json!(self.max_output_tokens);
        }
        body
    }
}

impl ReasoningEngine for OpenAiEngine {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = self.client.post(&self.url).bearer_auth(&self.api_key);
        let v = post_json(request, Self::BACKEND, &self.url, &self.request_body(prompt))?;
        openai_extract_text(&v).ok_or(LlmError::EmptyResponse {
            backend: Self::BACKEND,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn openai_extract_text(v: &Value) -> Option<String> {
    let text = v
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()?
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}

// =============================================================================
// Anthropic (messages)
// =============================================================================

pub struct AnthropicEngine {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    version: String,
    model: String,
    max_output_tokens: u32,
}

impl AnthropicEngine {
    const BACKEND: &'static str = "anthropic";

    pub fn new(config: &LlmConfig, model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(config.timeout, Self::BACKEND)?,
            url: format!("{}/v1/messages", config.base_url),
            api_key: config.api_key()?.to_string(),
            version: config.anthropic_version.clone(),
            model: model.into(),
            max_output_tokens: config.max_output_tokens,
        })
    }
}

impl ReasoningEngine for AnthropicEngine {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_output_tokens,
            "temperature": 0,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version);
        let v = post_json(request, Self::BACKEND, &self.url, &body)?;
        anthropic_extract_text(&v).ok_or(LlmError::EmptyResponse {
            backend: Self::BACKEND,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn anthropic_extract_text(v: &Value) -> Option<String> {
    let mut out = String::new();
    for block in v.get("content")?.as_array()? {
        if block.get("type").and_then(Value::as_str) != Some("text") {
            continue;
        }
        if let Some(t) = block.get("text").and_then(Value::as_str) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(t);
        }
    }
    let trimmed = out.trim().to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

// =============================================================================
// Ollama (local chat)
// =============================================================================

pub struct OllamaEngine {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
}

impl OllamaEngine {
    const BACKEND: &'static str = "ollama";

    pub fn new(config: &LlmConfig, model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(config.timeout, Self::BACKEND)?,
            url: format!("{}/api/chat", config.base_url),
            model: model.into(),
        })
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    content: String,
}

impl ReasoningEngine for OllamaEngine {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": [{ "role": "user", "content": prompt }],
            "options": { "temperature": 0 },
        });
        let v = post_json(self.client.post(&self.url), Self::BACKEND, &self.url, &body)?;
        let out: OllamaChatResponse =
            serde_json::from_value(v).map_err(|e| LlmError::InvalidResponse {
                backend: Self::BACKEND,
                message: e.to_string(),
            })?;
        let text = out.message.content.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse {
                backend: Self::BACKEND,
            });
        }
        Ok(text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build the engine for `model` on the configured backend.
pub fn build_engine(config: &LlmConfig, model: &str) -> Result<Arc<dyn ReasoningEngine>, LlmError> {
    let engine: Arc<dyn ReasoningEngine> = match config.backend {
        LlmBackendKind::OpenAi => Arc::new(OpenAiEngine::new(config, model)?),
        LlmBackendKind::Anthropic => Arc::new(AnthropicEngine::new(config, model)?),
        LlmBackendKind::Ollama => Arc::new(OllamaEngine::new(config, model)?),
    };
    tracing::debug!(backend = config.backend.as_str(), model, "reasoning engine ready");
    Ok(engine)
}
