use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use serde::Deserialize;
use serde_json::json;
use smith::models::message::Message;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default = "default_author")]
    author: String,
}

fn default_author() -> String {
    "User".to_string()
}

/// Server-sent events, one per emitted message
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = axum::body::Body::from_stream(self);
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            body,
        )
            .into_response()
    }
}

struct EventFormatter;

impl EventFormatter {
    fn format(event: &str, data: &serde_json::Value) -> String {
        format!("event: {}\ndata: {}\n\n", event, data)
    }

    fn format_session(id: &str) -> String {
        Self::format("session", &json!({ "session_id": id }))
    }

    fn format_message(message: &Message) -> String {
        Self::format("message", &json!(message))
    }

    fn format_done() -> String {
        Self::format("done", &json!({}))
    }
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, (StatusCode, String)> {
    let existing = match &request.session_id {
        Some(id) => state.session(id).await.map(|handle| (id.clone(), handle)),
        None => None,
    };

    // no id or an unknown id starts a fresh conversation
    let (session_id, handle, continuing) = match existing {
        Some((id, handle)) => (id, handle, true),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            let handle = state.create_session(&id).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to create session");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            })?;
            (id, handle, false)
        }
    };

    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    tokio::spawn(async move {
        if tx.send(EventFormatter::format_session(&session_id)).await.is_err() {
            return;
        }

        let mut agent = handle.lock().await;
        let mut messages = if continuing {
            agent.continue_conversation(&request.question, &request.author)
        } else {
            agent.start_conversation(&request.question, &request.author)
        };

        loop {
            match timeout(Duration::from_millis(500), messages.next()).await {
                Ok(Some(message)) => {
                    if let Err(e) = tx.send(EventFormatter::format_message(&message)).await {
                        tracing::error!("Error sending message through channel: {}", e);
                        break;
                    }
                }
                Ok(None) => break,
                // heartbeat, used to notice disconnected clients mid-turn
                Err(_) => {
                    if tx.is_closed() {
                        tracing::info!(session = %session_id, "Client disconnected");
                        break;
                    }
                }
            }
        }

        let _ = tx.send(EventFormatter::format_done()).await;
    });

    Ok(SseResponse::new(stream))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handler))
        .with_state(state)
}
