use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prompt text with its token count, computed by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    pub token_count: usize,
}

impl Prompt {
    pub fn new(text: impl Into<String>, token_count: usize) -> Self {
        Self {
            text: text.into(),
            token_count,
        }
    }
}

/// A single benchmark request, owned by the orchestrator.
///
/// The client reads it and hands it back unchanged with the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub model: String,
    pub prompt: Prompt,
    /// Merged verbatim on top of the request body
    #[serde(default)]
    pub sampling_params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_api: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl RequestConfig {
    pub fn new(model: impl Into<String>, prompt: Prompt) -> Self {
        Self {
            model: model.into(),
            prompt,
            sampling_params: Map::new(),
            provider: None,
            llm_api: None,
            metadata: None,
        }
    }

    pub fn with_sampling_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.sampling_params.insert(key.into(), value);
        self
    }

    pub fn with_provider(mut self, provider: Value) -> Self {
        self.provider = Some(provider);
        self
    }
}
