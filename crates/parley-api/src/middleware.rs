use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;

pub use parley_types::api::Claims;

use crate::admission::{Admission, AdmissionGate};
use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate the JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// Gate anonymous routes (register, login) per client address. Every attempt
/// counts, whatever the handler later decides.
pub async fn throttle_by_client(
    State(gate): State<Arc<dyn AdmissionGate<IpAddr>>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_addr(&req);
    if let Admission::Throttled { retry_after } = gate.admit(client) {
        warn!("{} throttled for client {} (retry in {:?})", req.uri().path(), client, retry_after);
        return Err(ApiError::RateLimited { retry_after });
    }
    Ok(next.run(req).await)
}

/// First `X-Forwarded-For` hop if present, else the peer address. Requests
/// with neither share one bucket.
fn client_addr(req: &Request) -> IpAddr {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|hop| hop.trim().parse().ok())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
