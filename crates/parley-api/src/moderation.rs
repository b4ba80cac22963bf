use std::sync::Arc;

use tracing::info;

use parley_db::Database;
use parley_types::models::{BlockStatus, UserId};

use crate::error::{ApiError, ApiResult};

/// Block, unblock and block-status queries over the directional block relation.
pub struct ModerationService {
    db: Arc<Database>,
}

impl ModerationService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn block(&self, requester: UserId, target: UserId) -> ApiResult<()> {
        if requester == target {
            return Err(ApiError::Validation("You cannot block yourself.".into()));
        }
        if !self.db.user_exists(target)? {
            return Err(ApiError::NotFound("User not found".into()));
        }

        if self.db.insert_block(requester, target)? {
            info!("User {} blocked user {}", requester, target);
        }
        Ok(())
    }

    /// Target existence is not checked; unblocking an unknown user removes nothing.
    pub fn unblock(&self, requester: UserId, target: UserId) -> ApiResult<()> {
        if self.db.delete_block(requester, target)? {
            info!("User {} unblocked user {}", requester, target);
        }
        Ok(())
    }

    pub fn status(&self, requester: UserId, target: UserId) -> ApiResult<BlockStatus> {
        if !self.db.user_exists(target)? {
            return Err(ApiError::NotFound("User not found".into()));
        }
        Ok(self.db.block_status(requester, target)?)
    }
}
