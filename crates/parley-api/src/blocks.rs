use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};

use parley_types::api::{BlockRequest, BlockResponse, TargetQuery};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::Claims;
use crate::run_blocking;

/// POST /api/chat/block
pub async fn block_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<BlockRequest>,
) -> ApiResult<impl IntoResponse> {
    let target = req
        .user_id
        .filter(|&id| id != 0)
        .ok_or_else(|| ApiError::Validation("user_id is required".into()))?;

    run_blocking(move || state.moderation.block(claims.sub, target)).await?;
    Ok(Json(BlockResponse { blocked: true }))
}

/// DELETE /api/chat/block?user_id=3
pub async fn unblock_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppQuery(query): AppQuery<TargetQuery>,
) -> ApiResult<impl IntoResponse> {
    let target = query
        .user_id
        .ok_or_else(|| ApiError::Validation("user_id is required".into()))?;

    run_blocking(move || state.moderation.unblock(claims.sub, target)).await?;
    Ok(Json(BlockResponse { blocked: false }))
}

/// GET /api/chat/block/status?user_id=3
pub async fn block_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppQuery(query): AppQuery<TargetQuery>,
) -> ApiResult<impl IntoResponse> {
    let target = query
        .user_id
        .ok_or_else(|| ApiError::Validation("user_id query param is required".into()))?;

    let status = run_blocking(move || state.moderation.status(claims.sub, target)).await?;
    Ok(Json(status))
}
