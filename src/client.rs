//! Streaming chat-completions client that turns one request into a metrics record.

use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::error::{FailureKind, RequestFailure, Result};
use crate::models::{MetricsRecord, RequestConfig};
use crate::streaming::{SseLineDecoder, StreamAccumulator};
use crate::tokenizer::TokenCounter;

/// Result of executing one request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Stream completed and at least one token arrived
    Success {
        metrics: MetricsRecord,
        generated_text: String,
        request: RequestConfig,
    },
    /// HTTP status, in-stream or transport failure
    Failed {
        kind: FailureKind,
        metrics: MetricsRecord,
        generated_text: String,
        request: RequestConfig,
    },
    /// Stream completed without a single token; no metrics record
    Empty {
        generated_text: String,
        request: RequestConfig,
    },
}

impl RequestOutcome {
    pub fn metrics(&self) -> Option<&MetricsRecord> {
        match self {
            RequestOutcome::Success { metrics, .. } | RequestOutcome::Failed { metrics, .. } => {
                Some(metrics)
            }
            RequestOutcome::Empty { .. } => None,
        }
    }

    pub fn generated_text(&self) -> &str {
        match self {
            RequestOutcome::Success { generated_text, .. }
            | RequestOutcome::Failed { generated_text, .. }
            | RequestOutcome::Empty { generated_text, .. } => generated_text,
        }
    }

    pub fn request(&self) -> &RequestConfig {
        match self {
            RequestOutcome::Success { request, .. }
            | RequestOutcome::Failed { request, .. }
            | RequestOutcome::Empty { request, .. } => request,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success { .. })
    }
}

/// Chat-completions client for latency measurement.
///
/// Cheap to share: `execute` takes `&self` and keeps all per-request state on
/// its own stack, so concurrent calls never see each other's trace.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    /// Shared HTTP client with connection pooling
    http: Client,

    config: ClientConfig,

    /// Precomputed `{base}/chat/completions`
    url: String,

    token_counter: TokenCounter,
}

impl ChatCompletionsClient {
    /// Create a client from validated configuration.
    ///
    /// Loads the token encoding; configuration and tokenizer failures are fatal.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let token_counter = TokenCounter::cl100k_base()?;

        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        let url = config.chat_completions_url();
        debug!(url = %url, "Chat completions client initialized");

        Ok(Self {
            http,
            config,
            url,
            token_counter,
        })
    }

    /// Create a client from `OPENAI_API_BASE` / `OPENAI_API_KEY`
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token_counter(&self) -> TokenCounter {
        self.token_counter
    }

    /// Execute one streaming request and derive its metrics.
    ///
    /// Never fails: every per-request problem resolves to `Failed` or `Empty`.
    pub async fn execute(&self, request: RequestConfig) -> RequestOutcome {
        let body = build_request_body(&request);
        debug!(body = %body, "Sending chat completion request");

        let mut accumulator = StreamAccumulator::new(Instant::now());
        let result = self.stream_response(&body, &mut accumulator).await;
        let finished_at = Instant::now();

        let start = accumulator.start();
        let (trace, generated_text) = accumulator.into_parts();
        let input_tokens = request.prompt.token_count;

        if let Err(failure) = result {
            error!(
                kind = ?failure.kind(),
                code = failure.code(),
                message = %failure.message(),
                model = %request.model,
                "Request failed"
            );
            return RequestOutcome::Failed {
                kind: failure.kind(),
                metrics: MetricsRecord::from_failure(&failure, input_tokens),
                generated_text,
                request,
            };
        }

        let end_to_end_latency = finished_at.saturating_duration_since(start);
        let output_tokens = self.token_counter.count_completion(&generated_text);

        match MetricsRecord::from_trace(&trace, end_to_end_latency, output_tokens, input_tokens) {
            Some(metrics) => {
                debug!(
                    ttft_ms = metrics.time_to_first_token.as_millis() as u64,
                    e2e_ms = metrics.end_to_end_latency.as_millis() as u64,
                    output_tokens = metrics.output_tokens,
                    "Request completed"
                );
                RequestOutcome::Success {
                    metrics,
                    generated_text,
                    request,
                }
            }
            None => {
                warn!(model = %request.model, "No tokens received");
                RequestOutcome::Empty {
                    generated_text,
                    request,
                }
            }
        }
    }

    /// Send the request and feed every arriving line into the accumulator.
    ///
    /// Returns as soon as a failure is classified; dropping the response
    /// releases the connection on every path.
    async fn stream_response(
        &self,
        body: &Value,
        accumulator: &mut StreamAccumulator,
    ) -> std::result::Result<(), RequestFailure> {
        let response = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        status = status.as_u16(),
                        error = %e,
                        "Failed to read error response body"
                    );
                    format!("<failed to read body: {}>", e)
                }
            };
            warn!(
                status = status.as_u16(),
                url = %self.url,
                response_body = %error_text,
                "Received error response"
            );
            return Err(RequestFailure::HttpStatus {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let mut byte_stream = response.bytes_stream();
        let mut decoder = SseLineDecoder::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            let arrived_at = Instant::now();
            for line in decoder.feed(&chunk) {
                accumulator.on_line(&line, arrived_at)?;
            }
        }

        if let Some(line) = decoder.finish() {
            accumulator.on_line(&line, Instant::now())?;
        }

        if !accumulator.saw_done() {
            debug!("Stream ended without [DONE] marker");
        }

        Ok(())
    }
}

/// Build the chat-completions body for a request.
///
/// `sampling_params` are merged last and may overwrite `model`, `messages` or
/// `stream`; that passthrough is intentional.
pub fn build_request_body(request: &RequestConfig) -> Value {
    let mut body = Map::new();
    body.insert("model".to_string(), json!(request.model));
    body.insert(
        "messages".to_string(),
        json!([
            {"role": "system", "content": ""},
            {"role": "user", "content": request.prompt.text},
        ]),
    );
    body.insert("stream".to_string(), json!(true));

    if let Some(provider) = request.provider.as_ref().filter(|p| !p.is_null()) {
        body.insert("provider".to_string(), provider.clone());
    }

    for (key, value) in &request.sampling_params {
        body.insert(key.clone(), value.clone());
    }

    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Prompt;

    fn request() -> RequestConfig {
        RequestConfig::new("test-model", Prompt::new("Say hello", 3))
    }

    #[test]
    fn test_build_request_body_shape() {
        let body = build_request_body(&request());

        assert_eq!(
            body,
            json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": ""},
                    {"role": "user", "content": "Say hello"}
                ],
                "stream": true
            })
        );
    }

    #[test]
    fn test_build_request_body_merges_sampling_params() {
        let request = request()
            .with_sampling_param("max_tokens", json!(256))
            .with_sampling_param("temperature", json!(0.7));
        let body = build_request_body(&request);

        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["model"], "test-model");
    }

    #[test]
    fn test_build_request_body_reserved_keys_are_overwritten() {
        // Passthrough: colliding keys replace the defaults without validation
        let request = request()
            .with_sampling_param("model", json!("override-model"))
            .with_sampling_param("stream", json!(false));
        let body = build_request_body(&request);

        assert_eq!(body["model"], "override-model");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_build_request_body_provider_only_when_present() {
        let body = build_request_body(&request());
        assert!(body.get("provider").is_none());

        let body = build_request_body(&request().with_provider(Value::Null));
        assert!(body.get("provider").is_none());

        let body = build_request_body(&request().with_provider(json!({"order": ["together"]})));
        assert_eq!(body["provider"], json!({"order": ["together"]}));
    }

    #[test]
    fn test_new_rejects_missing_key() {
        let err = ChatCompletionsClient::new(ClientConfig::new("http://localhost:8000", ""))
            .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_client_url_is_normalized() {
        let a = ChatCompletionsClient::new(ClientConfig::new("http://localhost:8000/v1", "k"))
            .unwrap();
        let b = ChatCompletionsClient::new(ClientConfig::new("http://localhost:8000/v1/", "k"))
            .unwrap();
        assert_eq!(a.url(), b.url());
        assert_eq!(a.url(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = RequestOutcome::Empty {
            generated_text: String::new(),
            request: request(),
        };
        assert!(outcome.metrics().is_none());
        assert!(!outcome.is_success());
        assert_eq!(outcome.request().model, "test-model");
    }
}
