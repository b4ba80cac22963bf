pub mod admission;
pub mod auth;
pub mod blocks;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod messages;
pub mod middleware;
pub mod moderation;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tracing::error;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// All API routes. Everything except register/login sits behind `require_auth`;
/// those two are throttled per client address instead.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route(
            "/api/auth/register",
            post(auth::register).layer(axum_middleware::from_fn_with_state(
                state.throttles.register.clone(),
                middleware::throttle_by_client,
            )),
        )
        .route(
            "/api/auth/login",
            post(auth::login).layer(axum_middleware::from_fn_with_state(
                state.throttles.login.clone(),
                middleware::throttle_by_client,
            )),
        )
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/chat/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/api/chat/unread", get(messages::unread_counts))
        .route(
            "/api/chat/block",
            post(blocks::block_user).delete(blocks::unblock_user),
        )
        .route("/api/chat/block/status", get(blocks::block_status))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Run a synchronous store operation off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.into())
    })?
}
