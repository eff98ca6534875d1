//! Chat handlers
//!
//! `POST /chat` answers in one JSON body. `POST /chat/stream` answers as
//! server-sent events: `{"text": ..}` increments, then `{"done": true}`, or
//! `{"error": ..}` if the model fails once the stream is open. Anything that
//! fails before the stream opens is an ordinary error response.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;
use validator::Validate;

use crate::AppState;
use wayfarer_common::{
    auth::AuthContext,
    errors::{AppError, Result},
};

/// Chat request
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,
}

impl ChatRequest {
    fn check(&self) -> Result<()> {
        self.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: Some("query".to_string()),
        })?;

        if self.query.trim().is_empty() {
            return Err(AppError::Validation {
                message: "query must not be blank".to_string(),
                field: Some("query".to_string()),
            });
        }
        Ok(())
    }
}

/// Buffered chat reply
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/// Answer a travel question in one piece
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>> {
    let start = Instant::now();
    request.check()?;

    let reply = state.assistant.answer(&request.query).await?;

    info!(
        request_id = %auth.request_id,
        user_id = auth.user_id.as_deref().unwrap_or("anonymous"),
        reply_chars = reply.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Chat answered"
    );

    Ok(Json(ChatReply { reply }))
}

/// Answer a travel question as an event stream
pub async fn chat_stream(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    request.check()?;

    let events = state.assistant.stream(&request.query).await?;

    info!(
        request_id = %auth.request_id,
        user_id = auth.user_id.as_deref().unwrap_or("anonymous"),
        "Chat stream opened"
    );

    let stream = events.map(|event| Event::default().json_data(event.payload()));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
