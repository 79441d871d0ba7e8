//! Chat-completion client over HTTP.

use super::{ChatMessage, ChatRequest, ChatResponse, Completion, TextService};
use crate::config::ServiceConfig;
use crate::errors::{Result, ServiceError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Instant;
use tracing::{debug, warn};

/// Longest error body kept in a [`ServiceError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Talks to an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpTextService {
    client: Client,
    config: ServiceConfig,
    api_key: String,
}

impl std::fmt::Debug for HttpTextService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTextService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpTextService {
    /// Creates a client. Fails with a configuration error when no API key is set.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("copyflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Creates a client from `OPENAI_API_KEY` and friends.
    pub fn from_env() -> Result<Self> {
        Self::new(ServiceConfig::from_env()?)
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    async fn send_once(&self, request: &ChatRequest) -> std::result::Result<Completion, ServiceError> {
        let started = Instant::now();
        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        let content = parsed.first_content()?.to_string();
        let finish_reason = parsed.choices.first().and_then(|c| c.finish_reason.clone());

        #[allow(clippy::cast_precision_loss)]
        let latency_ms = started.elapsed().as_micros() as f64 / 1000.0;

        Ok(Completion {
            content,
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            input_tokens: parsed.usage.and_then(|u| u.prompt_tokens),
            output_tokens: parsed.usage.and_then(|u| u.completion_tokens),
            latency_ms: Some(latency_ms),
            finish_reason,
        })
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[async_trait]
impl TextService for HttpTextService {
    async fn complete(&self, messages: &[ChatMessage]) -> std::result::Result<Completion, ServiceError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            match self.send_once(&request).await {
                Ok(completion) => {
                    debug!(
                        model = %completion.model,
                        tokens = completion.total_tokens(),
                        attempt,
                        "Completion received"
                    );
                    return Ok(completion);
                }
                Err(err) => {
                    let retryable = match &err {
                        ServiceError::Status { status, .. } => retry.should_retry_status(*status),
                        other => other.is_retryable(),
                    };
                    if !retryable || attempt >= retry.max_retries {
                        return Err(err);
                    }
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "Retrying completion request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
