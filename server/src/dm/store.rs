//! Durable message storage.
//!
//! The live path only ever sees messages after `persist` has returned, and
//! history reads go straight to the store. SQLite is synchronous, so async
//! callers run these methods inside `tokio::task::spawn_blocking`.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;

use super::{Message, NewMessage};
use crate::db::DbPool;
use crate::presence::UserId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    LockPoisoned,
}

/// Append-only record of direct messages.
pub trait MessageStore: Send + Sync {
    /// Persist a message and return it with its assigned id.
    fn persist(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Every message exchanged between two users, in either direction,
    /// oldest first.
    fn find(&self, user_a: &UserId, user_b: &UserId) -> Result<Vec<Message>, StoreError>;
}

/// `MessageStore` backed by the shared SQLite connection.
#[derive(Clone)]
pub struct SqliteMessageStore {
    db: DbPool,
}

impl SqliteMessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl MessageStore for SqliteMessageStore {
    fn persist(&self, message: NewMessage) -> Result<Message, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;

        let id = uuid::Uuid::now_v7().to_string();
        // Stored at millisecond precision; return exactly what a later read yields.
        let created_at = message.created_at.trunc_subsecs(3);

        let _ = conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                id,
                message.sender_user_id.as_str(),
                message.receiver_user_id.as_str(),
                message.text,
                message.image_ref,
                created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ],
        )?;

        Ok(Message {
            id,
            sender_user_id: message.sender_user_id,
            receiver_user_id: message.receiver_user_id,
            text: message.text,
            image_ref: message.image_ref,
            created_at,
        })
    }

    fn find(&self, user_a: &UserId, user_b: &UserId) -> Result<Vec<Message>, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut stmt = conn.prepare(
            "SELECT id, sender_id, receiver_id, text, image_ref, created_at
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(rusqlite::params![user_a.as_str(), user_b.as_str()], |row| {
            let created_at: String = row.get(5)?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
                .with_timezone(&Utc);

            Ok(Message {
                id: row.get(0)?,
                sender_user_id: UserId(row.get(1)?),
                receiver_user_id: UserId(row.get(2)?),
                text: row.get(3)?,
                image_ref: row.get(4)?,
                created_at,
            })
        })?;

        let messages = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}
