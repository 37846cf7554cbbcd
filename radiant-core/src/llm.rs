//! Model invocation — chat completions over HTTP with candidate fallback
//!
//! Provides a `ChatBackend` trait with one implementation:
//! - **OpenRouter** — any OpenAI-compatible `/chat/completions` endpoint
//!
//! `ModelInvoker` walks a fixed candidate list against a backend and returns
//! the first successful reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelConfig;
use crate::models::ChatMessage;

// ============================================================================
// ChatBackend trait
// ============================================================================

/// Abstraction over a completions provider. One call, one model, no retries.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send `messages` to `model` and return the reply text.
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, InvokeError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Request to {model} timed out")]
    Timeout { model: String },

    #[error("Request to {model} failed: {message}")]
    Transport {
        model: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed response from {model}: {reason}")]
    MalformedResponse { model: String, reason: String },

    #[error("All {attempts} model candidates failed")]
    AllCandidatesExhausted {
        attempts: usize,
        last: Option<Box<InvokeError>>,
    },

    #[error("Image analysis is disabled")]
    VisionDisabled,
}

impl InvokeError {
    /// Stable identifier used as the `error_kind` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            InvokeError::Timeout { .. } => "timeout",
            InvokeError::Transport { .. } => "transport_or_status",
            InvokeError::MalformedResponse { .. } => "malformed_response",
            InvokeError::AllCandidatesExhausted { .. } => "all_candidates_exhausted",
            InvokeError::VisionDisabled => "vision_disabled",
        }
    }

    /// The failure that decided the outcome: the last candidate's error for
    /// an exhausted list, otherwise `self`.
    pub fn root(&self) -> &InvokeError {
        match self {
            InvokeError::AllCandidatesExhausted {
                last: Some(last), ..
            } => last.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), InvokeError::Timeout { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(
            self.root(),
            InvokeError::Transport {
                status: Some(401 | 403),
                ..
            }
        )
    }

    fn from_reqwest(model: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InvokeError::Timeout {
                model: model.to_string(),
            }
        } else {
            InvokeError::Transport {
                model: model.to_string(),
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

// ============================================================================
// Completions API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// OpenRouterClient
// ============================================================================

/// Chat completions client for OpenRouter or any OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    base_url: String,
    temperature: f64,
}

impl OpenRouterClient {
    pub fn new(config: &ModelConfig) -> Result<Self, reqwest::Error> {
        Self::with_base_url(config, config.base_url.clone())
    }

    /// Create a client with a custom base URL (for testing / self-hosted gateways)
    pub fn with_base_url(config: &ModelConfig, base_url: String) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
        })
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, reqwest::Error> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }
}

#[async_trait]
impl ChatBackend for OpenRouterClient {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, InvokeError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = CompletionRequest {
            model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| InvokeError::from_reqwest(model, e))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            return Err(InvokeError::Transport {
                model: model.to_string(),
                status: Some(status.as_u16()),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| InvokeError::from_reqwest(model, e))?;

        let parsed: CompletionResponse =
            serde_json::from_slice(&body).map_err(|e| InvokeError::MalformedResponse {
                model: model.to_string(),
                reason: e.to_string(),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InvokeError::MalformedResponse {
                model: model.to_string(),
                reason: "no choices".to_string(),
            })?
            .message
            .content
            .ok_or_else(|| InvokeError::MalformedResponse {
                model: model.to_string(),
                reason: "choice has no message content".to_string(),
            })
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

// ============================================================================
// ModelInvoker
// ============================================================================

/// A successful completion and the candidate that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub model: String,
    pub reply: String,
}

/// Walks the configured candidates in order until one answers.
#[derive(Clone)]
pub struct ModelInvoker {
    backend: Arc<dyn ChatBackend>,
    text_candidates: Vec<String>,
    vision_candidates: Vec<String>,
    vision_enabled: bool,
}

impl ModelInvoker {
    pub fn new(backend: Arc<dyn ChatBackend>, config: &ModelConfig) -> Self {
        Self {
            backend,
            text_candidates: config.text_candidates.clone(),
            vision_candidates: config.vision_candidates.clone(),
            vision_enabled: config.vision_enabled,
        }
    }

    pub async fn invoke(
        &self,
        messages: &[ChatMessage],
        has_image: bool,
    ) -> Result<Invocation, InvokeError> {
        let candidates = if has_image {
            if !self.vision_enabled {
                tracing::info!(
                    error_kind = "vision_disabled",
                    "Image turn refused by configuration"
                );
                return Err(InvokeError::VisionDisabled);
            }
            &self.vision_candidates
        } else {
            &self.text_candidates
        };

        let mut last = None;
        for (attempt, model) in candidates.iter().enumerate() {
            match self.backend.complete(model, messages).await {
                Ok(reply) => {
                    tracing::info!(
                        model = %model,
                        attempt = attempt + 1,
                        backend = self.backend.name(),
                        "Model candidate answered"
                    );
                    return Ok(Invocation {
                        model: model.clone(),
                        reply,
                    });
                }
                Err(e) => {
                    match &e {
                        InvokeError::Timeout { .. } => tracing::warn!(
                            model = %model, attempt = attempt + 1, error_kind = e.kind(),
                            "Model candidate timed out"
                        ),
                        InvokeError::Transport { status, .. } => tracing::warn!(
                            model = %model, attempt = attempt + 1, error_kind = e.kind(),
                            status = ?status, error = %e,
                            "Model candidate transport or status failure"
                        ),
                        InvokeError::MalformedResponse { .. } => tracing::warn!(
                            model = %model, attempt = attempt + 1, error_kind = e.kind(),
                            error = %e,
                            "Model candidate returned a malformed body"
                        ),
                        _ => tracing::warn!(
                            model = %model, attempt = attempt + 1, error_kind = e.kind(),
                            error = %e,
                            "Model candidate failed"
                        ),
                    }
                    last = Some(Box::new(e));
                }
            }
        }

        tracing::error!(
            attempts = candidates.len(),
            error_kind = "all_candidates_exhausted",
            has_image,
            "All model candidates failed"
        );
        Err(InvokeError::AllCandidatesExhausted {
            attempts: candidates.len(),
            last,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
