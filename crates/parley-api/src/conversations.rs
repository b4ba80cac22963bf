use std::sync::Arc;

use tracing::{debug, warn};

use parley_db::Database;
use parley_types::models::{Message, MessageId, UnreadCount, UserId};

use crate::admission::{Admission, AdmissionGate};
use crate::error::{ApiError, ApiResult};

/// Message exchange between two users: sending under the block rules,
/// fetching (which acknowledges incoming messages) and unread totals.
pub struct ConversationService {
    db: Arc<Database>,
    gate: Arc<dyn AdmissionGate>,
}

impl ConversationService {
    pub fn new(db: Arc<Database>, gate: Arc<dyn AdmissionGate>) -> Self {
        Self { db, gate }
    }

    /// Checks run in a fixed order: admission, receiver existence, the
    /// sender's own block, then a block by the receiver. Only then is the
    /// message written. Sending to yourself is allowed.
    pub fn send(&self, sender: UserId, receiver_id: UserId, content: &str) -> ApiResult<Message> {
        if let Admission::Throttled { retry_after } = self.gate.admit(sender) {
            warn!("Send throttled for user {} (retry in {:?})", sender, retry_after);
            return Err(ApiError::RateLimited { retry_after });
        }

        if !self.db.user_exists(receiver_id)? {
            return Err(ApiError::NotFound("Receiver not found".into()));
        }

        if self.db.is_blocked(sender, receiver_id)? {
            return Err(ApiError::Forbidden("You blocked this user.".into()));
        }
        if self.db.is_blocked(receiver_id, sender)? {
            return Err(ApiError::Forbidden("This user has blocked you.".into()));
        }

        let row = self.db.append_message(sender, receiver_id, content)?;
        debug!("Message {} sent {} -> {}", row.id, sender, receiver_id);
        Ok(row.into_message())
    }

    /// Every fetch marks the other user's messages to the requester as read,
    /// including ones older than `after_id`.
    pub fn fetch(
        &self,
        requester: UserId,
        other_id: UserId,
        after_id: Option<MessageId>,
    ) -> ApiResult<Vec<Message>> {
        if !self.db.user_exists(other_id)? {
            return Err(ApiError::NotFound("User not found".into()));
        }

        let marked = self.db.mark_read_from(other_id, requester)?;

        let rows = match after_id {
            Some(after_id) => self.db.list_conversation_since(requester, other_id, after_id)?,
            None => self.db.list_conversation(requester, other_id)?,
        };
        debug!(
            "Fetch {} <-> {} after {:?}: {} messages, {} marked read",
            requester,
            other_id,
            after_id,
            rows.len(),
            marked
        );

        Ok(rows.into_iter().map(|row| row.into_message()).collect())
    }

    pub fn unread_summary(&self, requester: UserId) -> ApiResult<Vec<UnreadCount>> {
        let counts = self.db.unread_counts_by_sender(requester)?;
        Ok(counts
            .into_iter()
            .map(|(user_id, count)| UnreadCount { user_id, count })
            .collect())
    }
}
