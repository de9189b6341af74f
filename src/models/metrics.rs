//! Per-request metrics record.

use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::error::RequestFailure;
use crate::streaming::TimingTrace;

/// Metrics for one request, created once at the end of `execute`.
///
/// Serializes with the benchmark's canonical metric keys; durations are
/// written as floating-point seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRecord {
    pub error_code: Option<i64>,
    #[serde(rename = "error_msg")]
    pub error_message: String,
    #[serde(rename = "ttft_s", serialize_with = "serialize_secs")]
    pub time_to_first_token: Duration,
    #[serde(rename = "end_to_end_latency_s", serialize_with = "serialize_secs")]
    pub end_to_end_latency: Duration,
    #[serde(rename = "inter_token_latency_s", serialize_with = "serialize_secs")]
    pub mean_inter_token_latency: Duration,
    #[serde(rename = "request_output_throughput_token_per_s")]
    pub output_throughput: f64,
    #[serde(rename = "number_total_tokens")]
    pub total_tokens: usize,
    #[serde(rename = "number_output_tokens")]
    pub output_tokens: usize,
    #[serde(rename = "number_input_tokens")]
    pub input_tokens: usize,
}

impl MetricsRecord {
    /// Build the record for a completed stream.
    ///
    /// Returns `None` when the trace is empty: no tokens means no record.
    pub fn from_trace(
        trace: &TimingTrace,
        end_to_end_latency: Duration,
        output_tokens: usize,
        input_tokens: usize,
    ) -> Option<Self> {
        let time_to_first_token = trace.time_to_first_token()?;
        let mean_inter_token_latency = trace.mean()?;

        Some(Self {
            error_code: None,
            error_message: String::new(),
            time_to_first_token,
            end_to_end_latency,
            mean_inter_token_latency,
            output_throughput: throughput(output_tokens, end_to_end_latency),
            total_tokens: output_tokens + input_tokens,
            output_tokens,
            input_tokens,
        })
    }

    /// Build the record for a failed request.
    ///
    /// Only the error fields and the known prompt size are populated; timing
    /// and output fields stay at zero.
    ///
    /// This holds even when tokens arrived before the error: the partial trace
    /// is dropped, so `ttft_s` and `inter_token_latency_s` of a failed record
    /// are placeholders, not measurements. Aggregators should filter on
    /// `error_code` before reading timing fields.
    pub fn from_failure(failure: &RequestFailure, input_tokens: usize) -> Self {
        Self {
            error_code: Some(failure.code()),
            error_message: failure.message().to_string(),
            time_to_first_token: Duration::ZERO,
            end_to_end_latency: Duration::ZERO,
            mean_inter_token_latency: Duration::ZERO,
            output_throughput: 0.0,
            total_tokens: input_tokens,
            output_tokens: 0,
            input_tokens,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Output tokens per second of wall-clock time.
///
/// A zero elapsed time (below clock resolution) reports 0.0 rather than dividing by zero.
pub fn throughput(tokens: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        tracing::warn!(tokens, "Zero elapsed time, reporting throughput as 0");
        return 0.0;
    }
    tokens as f64 / secs
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trace_of(millis: &[u64]) -> TimingTrace {
        let mut trace = TimingTrace::default();
        for ms in millis {
            trace.push(Duration::from_millis(*ms));
        }
        trace
    }

    #[test]
    fn test_from_trace_computes_metrics() {
        let trace = trace_of(&[200, 50, 50, 100]);
        let record = MetricsRecord::from_trace(&trace, Duration::from_secs(2), 20, 12).unwrap();

        assert_eq!(record.error_code, None);
        assert_eq!(record.error_message, "");
        assert_eq!(record.time_to_first_token, Duration::from_millis(200));
        assert_eq!(record.mean_inter_token_latency, Duration::from_millis(100));
        assert_eq!(record.end_to_end_latency, Duration::from_secs(2));
        assert!((record.output_throughput - 10.0).abs() < 1e-9);
        assert_eq!(record.output_tokens, 20);
        assert_eq!(record.input_tokens, 12);
        assert_eq!(record.total_tokens, 32);
    }

    #[test]
    fn test_from_trace_empty_is_none() {
        let trace = TimingTrace::default();
        assert!(MetricsRecord::from_trace(&trace, Duration::from_secs(1), 0, 5).is_none());
    }

    #[test]
    fn test_zero_elapsed_throughput_guard() {
        assert_eq!(throughput(10, Duration::ZERO), 0.0);
        assert!((throughput(10, Duration::from_millis(500)) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_failure_zeroes_timing() {
        let failure = RequestFailure::HttpStatus {
            status: 500,
            body: "boom".to_string(),
        };
        let record = MetricsRecord::from_failure(&failure, 7);

        assert!(record.is_error());
        assert_eq!(record.error_code, Some(500));
        assert_eq!(record.error_message, "boom");
        assert_eq!(record.time_to_first_token, Duration::ZERO);
        assert_eq!(record.output_throughput, 0.0);
        assert_eq!(record.output_tokens, 0);
        assert_eq!(record.input_tokens, 7);
    }

    #[test]
    fn test_serializes_with_canonical_keys() {
        let trace = trace_of(&[500]);
        let record = MetricsRecord::from_trace(&trace, Duration::from_secs(1), 4, 6).unwrap();
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(
            value,
            json!({
                "error_code": null,
                "error_msg": "",
                "ttft_s": 0.5,
                "end_to_end_latency_s": 1.0,
                "inter_token_latency_s": 0.5,
                "request_output_throughput_token_per_s": 4.0,
                "number_total_tokens": 10,
                "number_output_tokens": 4,
                "number_input_tokens": 6
            })
        );
    }
}
