// llmperf-client - Library root
//
// Streaming chat-completion client that measures time-to-first-token,
// inter-token latency, end-to-end latency and output throughput.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod streaming;
pub mod tokenizer;

pub use client::{build_request_body, ChatCompletionsClient, RequestOutcome};
pub use config::ClientConfig;
pub use error::{ClientError, FailureKind, RequestFailure};
pub use models::{MetricsRecord, Prompt, RequestConfig};
pub use tokenizer::TokenCounter;
