use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use parley_types::api::{ConversationQuery, SendMessageRequest};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::Claims;
use crate::run_blocking;

/// POST /api/chat/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    // A zero id counts as absent, like any other falsy receiver
    let receiver_id = req
        .receiver
        .filter(|&id| id != 0)
        .ok_or_else(|| ApiError::Validation("receiver is required".into()))?;
    // Missing content is rejected by the store, after the block checks
    let content = req.content.unwrap_or_default();

    let message = run_blocking(move || {
        state.conversations.send(claims.sub, receiver_id, &content)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/chat/messages?user_id=2[&after=10]
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppQuery(query): AppQuery<ConversationQuery>,
) -> ApiResult<impl IntoResponse> {
    let other_id = query
        .user_id
        .ok_or_else(|| ApiError::Validation("user_id query param is required".into()))?;

    let messages = run_blocking(move || {
        state.conversations.fetch(claims.sub, other_id, query.after)
    })
    .await?;

    Ok(Json(messages))
}

/// GET /api/chat/unread
pub async fn unread_counts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let counts = run_blocking(move || state.conversations.unread_summary(claims.sub)).await?;
    Ok(Json(counts))
}
