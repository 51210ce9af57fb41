//! OpenAI-compatible chat completions solver.
//!
//! Works against any endpoint that speaks the `/chat/completions` protocol
//! (OpenAI, Volcengine Ark, DeepSeek, vLLM, ...). This is the only place that
//! looks at HTTP status codes; everything leaves here as a `SolverError`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use hardness_core::error::SolverError;
use hardness_core::traits::{SolveRequest, Solver, DEFAULT_SYSTEM_PROMPT};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Settings for an [`OpenAiSolver`].
#[derive(Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: Option<f64>,
    pub system_prompt: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// OpenAI-compatible solver.
pub struct OpenAiSolver {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    system_prompt: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiSolver {
    pub fn new(settings: OpenAiSettings) -> anyhow::Result<Self> {
        let timeout_secs = settings.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        let base_url = settings
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key: settings.api_key,
            base_url,
            model: settings.model,
            temperature: settings.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            system_prompt: settings
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            timeout_secs,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Seconds from a `Retry-After` header. HTTP-date values are ignored.
fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000)
}

#[async_trait]
impl Solver for OpenAiSolver {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = %self.model, attempt = request.attempt))]
    async fn solve(&self, request: &SolveRequest) -> Result<String, SolverError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.statement,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SolverError::Timeout(self.timeout_secs)
                } else {
                    SolverError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        match status {
            429 => {
                let retry_after_ms = retry_after_ms(response.headers());
                return Err(SolverError::RateLimited { retry_after_ms });
            }
            401 | 403 => {
                let body = response.text().await.unwrap_or_default();
                return Err(SolverError::AuthenticationFailed(body));
            }
            404 => {
                return Err(SolverError::ModelNotFound(self.model.clone()));
            }
            s if s >= 400 => {
                let message = response.text().await.unwrap_or_default();
                return Err(SolverError::Api { status, message });
            }
            _ => {}
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                SolverError::Timeout(self.timeout_secs)
            } else {
                SolverError::Malformed(format!("failed to parse response: {e}"))
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SolverError::Malformed("response has no message content".into()))?;

        tracing::debug!(chars = content.len(), "solver responded");
        Ok(content)
    }
}
