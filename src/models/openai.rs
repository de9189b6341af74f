use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ==================================================================================================
// Models for /chat/completions requests
// ==================================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ==================================================================================================
// Models for streaming responses
// ==================================================================================================

/// One `data:` payload of a chat-completions stream, minus any `error` field.
///
/// Deserialized leniently: providers differ in which fields they send, a
/// trailing usage chunk may have no choices at all, and some send explicit
/// `null` for `choices` or `delta`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChatCompletionChunkChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionChunkChoice {
    /// Kept as a raw map so any candidate content field can be looked up by name
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: Map<String, Value>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl ChatCompletionChunk {
    /// Delta of the first choice, if the chunk has one
    pub fn first_delta(&self) -> Option<&Map<String, Value>> {
        self.choices.first().map(|choice| &choice.delta)
    }

    /// Finish reason of the first choice, if the provider sent one
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
    }
}

/// Treat an explicit `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
