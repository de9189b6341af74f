// Data models for requests, wire formats and results

pub mod metrics;
pub mod openai;
pub mod request;

pub use metrics::MetricsRecord;
pub use openai::ChatMessage;
pub use request::{Prompt, RequestConfig};
