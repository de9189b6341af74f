//! Mock chat-completions server that streams SSE lines with per-chunk delays.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    routing::post,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// One scripted chunk: wait `delay`, then write `payload` verbatim.
///
/// A chunk without a payload aborts the body with an I/O error instead.
#[derive(Debug, Clone)]
pub struct ScriptedChunk {
    pub delay: Duration,
    pub payload: Option<String>,
}

impl ScriptedChunk {
    pub fn new(delay_ms: u64, payload: impl Into<String>) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            payload: Some(payload.into()),
        }
    }

    /// Break the connection mid-body after `delay_ms`
    pub fn fail(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            payload: None,
        }
    }
}

struct Script {
    status: StatusCode,
    chunks: Vec<ScriptedChunk>,
}

/// SSE line for a content delta
pub fn content_event(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
        })
    )
}

pub const DONE_EVENT: &str = "data: [DONE]\n\n";

/// Mock server that replays a fixed script on every POST to `/v1/chat/completions`
pub struct MockSseServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockSseServer {
    /// Start the server on a random port, answering 200
    pub async fn start(script: Vec<ScriptedChunk>) -> anyhow::Result<Self> {
        Self::start_with_status(StatusCode::OK, script).await
    }

    /// Start the server on a random port, answering `status`
    pub async fn start_with_status(
        status: StatusCode,
        chunks: Vec<ScriptedChunk>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let app = Router::new()
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(Arc::new(Script { status, chunks }));

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            port,
        })
    }

    /// API base, without a trailing slash
    pub fn api_base(&self) -> String {
        format!("http://127.0.0.1:{}/v1", self.port)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockSseServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_chat(State(script): State<Arc<Script>>) -> Response {
    let status = script.status;
    let stream = async_stream::stream! {
        for chunk in script.chunks.iter() {
            tokio::time::sleep(chunk.delay).await;
            match &chunk.payload {
                Some(payload) => yield Ok(payload.clone()),
                None => {
                    yield Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "scripted failure",
                    ));
                    break;
                }
            }
        }
    };

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}
