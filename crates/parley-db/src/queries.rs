use crate::models::{MessageRow, UserRow};
use crate::{Database, InvalidInput, UniqueViolation};
use anyhow::Result;
use parley_types::models::BlockStatus;
use rusqlite::{Connection, ErrorCode, Row, params};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, is_read, created_at";

impl Database {
    // -- Users --

    /// Fails with `UniqueViolation` if the username is taken, even when a
    /// concurrent registration won the race after the caller checked.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, password) VALUES (?1, ?2)",
                (username, password_hash),
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => {
                    anyhow::Error::new(UniqueViolation::new("username already taken"))
                }
                _ => e.into(),
            })?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password, created_at FROM users WHERE username = ?1",
                [username],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password, created_at FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn user_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    // -- Messages --

    /// Persist a new unread message. Content is trimmed and must not end up empty.
    pub fn append_message(&self, sender_id: i64, receiver_id: i64, content: &str) -> Result<MessageRow> {
        let content = content.trim();
        if content.is_empty() {
            return Err(InvalidInput::new("content is required").into());
        }

        // The writer lock is held across insert + read-back, so last_insert_rowid is ours.
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, content) VALUES (?1, ?2, ?3)",
                params![sender_id, receiver_id, content],
            )?;
            let id = conn.last_insert_rowid();
            let row = conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [id],
                message_from_row,
            )?;
            Ok(row)
        })
    }

    /// Full history between two users, oldest first.
    pub fn list_conversation(&self, user_a: i64, user_b: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_conversation(conn, user_a, user_b, None))
    }

    /// Messages between two users with id strictly greater than `after_id`, oldest first.
    pub fn list_conversation_since(&self, user_a: i64, user_b: i64, after_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_conversation(conn, user_a, user_b, Some(after_id)))
    }

    /// Flip every unread `sender -> receiver` message to read. Returns how many changed.
    pub fn mark_read_from(&self, sender_id: i64, receiver_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                params![sender_id, receiver_id],
            )?;
            Ok(changed)
        })
    }

    /// Unread message counts addressed to `receiver_id`, grouped by sender, ordered by sender id.
    pub fn unread_counts_by_sender(&self, receiver_id: i64) -> Result<Vec<(i64, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, COUNT(*) FROM messages
                 WHERE receiver_id = ?1 AND is_read = 0
                 GROUP BY sender_id
                 ORDER BY sender_id",
            )?;

            let rows = stmt
                .query_map([receiver_id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as u64)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Blocks --

    pub fn is_blocked(&self, blocker_id: i64, blocked_id: i64) -> Result<bool> {
        self.with_conn(|conn| query_is_blocked(conn, blocker_id, blocked_id))
    }

    /// Idempotent: blocking an already-blocked user leaves the single existing row alone.
    /// Returns true if a new row was written.
    pub fn insert_block(&self, blocker_id: i64, blocked_id: i64) -> Result<bool> {
        if blocker_id == blocked_id {
            return Err(InvalidInput::new("You cannot block yourself.").into());
        }

        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id) VALUES (?1, ?2)",
                params![blocker_id, blocked_id],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Idempotent: returns true if a row was actually removed.
    pub fn delete_block(&self, blocker_id: i64, blocked_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
                params![blocker_id, blocked_id],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Both directions between `user_a` and `user_b`, from `user_a`'s point of view.
    pub fn block_status(&self, user_a: i64, user_b: i64) -> Result<BlockStatus> {
        self.with_conn(|conn| {
            Ok(BlockStatus {
                blocked_by_me: query_is_blocked(conn, user_a, user_b)?,
                blocked_me: query_is_blocked(conn, user_b, user_a)?,
            })
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        is_read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_conversation(
    conn: &Connection,
    user_a: i64,
    user_b: i64,
    after_id: Option<i64>,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE sender_id IN (?1, ?2) AND receiver_id IN (?1, ?2)
           AND (?3 IS NULL OR id > ?3)
         ORDER BY id ASC"
    ))?;

    let rows = stmt
        .query_map(params![user_a, user_b, after_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_is_blocked(conn: &Connection, blocker_id: i64, blocked_id: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2)",
        params![blocker_id, blocked_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
