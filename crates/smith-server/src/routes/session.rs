use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use smith::models::chat::Chat;

/// The persisted transcript of a session. Waits for a running turn to finish.
async fn handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Chat>, StatusCode> {
    let handle = state.session(&id).await.ok_or(StatusCode::NOT_FOUND)?;
    let agent = handle.lock().await;
    Ok(Json(agent.history().clone()))
}

async fn delete_handler(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.remove_session(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sessions/:id", get(handler).delete(delete_handler))
        .with_state(state)
}
