use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Users are owned by the identity layer; the chat core only ever sees their id.
pub type UserId = i64;

/// Message ids double as the polling cursor, so they are strictly increasing.
pub type MessageId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Block relation between the requester and one other user, seen from the requester's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockStatus {
    pub blocked_by_me: bool,
    pub blocked_me: bool,
}

impl BlockStatus {
    /// Either direction forbids sending.
    pub fn any(&self) -> bool {
        self.blocked_by_me || self.blocked_me
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub user_id: UserId,
    pub count: u64,
}
