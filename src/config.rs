use clap::Parser;
use serde_json::Value;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Path appended to the API base for chat completions
pub const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// Default request timeout (30 minutes) to accommodate slow generation
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 1800;

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Streaming chat-completion latency client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Model identifier sent in the request body
    #[arg(short, long, env = "LLMPERF_MODEL")]
    pub model: String,

    /// Prompt text sent as the user message
    #[arg(short, long)]
    pub prompt: String,

    /// Sampling parameter merged into the body (key=value, value parsed as JSON)
    #[arg(long = "param", value_parser = parse_sampling_param)]
    pub params: Vec<(String, Value)>,

    /// Provider routing value forwarded as-is (parsed as JSON, else a string)
    #[arg(long)]
    pub provider: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

/// Parse a `key=value` sampling parameter.
///
/// The value is decoded as JSON when possible (`max_tokens=128`, `stop=["\n"]`),
/// otherwise kept as a plain string.
pub fn parse_sampling_param(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    Ok((key.to_string(), parse_json_or_string(value)))
}

/// Decode a JSON literal, falling back to a plain string value
pub fn parse_json_or_string(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Endpoint and credential configuration for the chat-completions client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API base URL, e.g. `https://api.openai.com/v1`
    pub api_base: String,

    /// Bearer token sent in the Authorization header
    pub api_key: String,

    /// Whole-request timeout, including the streamed body
    pub request_timeout: Duration,

    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Load configuration from the environment (and `.env` if present).
    ///
    /// `OPENAI_API_BASE` and `OPENAI_API_KEY` are required and have no defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_base = required_env("OPENAI_API_BASE")?;
        let api_key = required_env("OPENAI_API_KEY")?;

        let config = Self {
            api_base,
            api_key,
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            connect_timeout: Duration::from_secs(
                std::env::var("CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(ClientError::Config(
                "the environment variable OPENAI_API_BASE must be set".to_string(),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(ClientError::Config(
                "the environment variable OPENAI_API_KEY must be set".to_string(),
            ));
        }
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "OPENAI_API_BASE must be an http(s) URL, got '{}'",
                self.api_base
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Full chat-completions URL.
    ///
    /// The base always ends with exactly one `/` before the path is appended.
    pub fn chat_completions_url(&self) -> String {
        let base = self.api_base.trim().trim_end_matches('/');
        format!("{}/{}", base, CHAT_COMPLETIONS_PATH)
    }
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ClientError::Config(format!(
            "the environment variable {} must be set",
            name
        ))),
    }
}
