//! Database row types, kept apart from the parley-types API models so the
//! storage layout can change without touching the wire format.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use parley_types::models::{Message, User};

#[derive(Debug)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> User {
        let created_at = parse_timestamp(&self.created_at, "user", self.id);
        User {
            id: self.id,
            username: self.username,
            created_at,
        }
    }
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        let created_at = parse_timestamp(&self.created_at, "message", self.id);
        Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            is_read: self.is_read,
            created_at,
        }
    }
}

/// SQLite's `datetime('now')` yields "YYYY-MM-DD HH:MM:SS" with no zone; it is UTC.
fn parse_timestamp(raw: &str, kind: &str, id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {} {}: {}", raw, kind, id, e);
            DateTime::default()
        })
}
