use serde::{Deserialize, Serialize};

use crate::models::{MessageId, UserId};

// -- JWT Claims --

/// Claims carried by every access token. `sub` is the authenticated user's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub username: String,
    pub token: String,
}

// -- Messages --

/// Both fields are optional on the wire so a missing one can be reported
/// with a precise detail instead of a generic deserialization failure.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver: Option<UserId>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub user_id: Option<UserId>,
    /// Polling cursor: only messages with a greater id are returned.
    pub after: Option<MessageId>,
}

// -- Blocks --

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub user_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockResponse {
    pub blocked: bool,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
