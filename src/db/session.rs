//! Chat session repository

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use super::memory::parse_datetime;
use crate::Result;

/// A text chat session
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message in a chat session
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Session repository
#[derive(Debug, Clone)]
pub struct SessionRepo {
    pool: DbPool,
}

impl SessionRepo {
    /// Create a new session repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find a session by id, or create one (with a fresh id when none is given)
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_or_create(&self, id: Option<&str>, phone: Option<&str>) -> Result<ChatSession> {
        let conn = super::conn(&self.pool)?;

        if let Some(id) = id {
            let existing = conn.query_row(
                "SELECT id, phone, created_at, updated_at FROM chat_sessions WHERE id = ?1",
                [id],
                |row| {
                    Ok(ChatSession {
                        id: row.get(0)?,
                        phone: row.get(1)?,
                        created_at: parse_datetime(&row.get::<_, String>(2)?),
                        updated_at: parse_datetime(&row.get::<_, String>(3)?),
                    })
                },
            );
            match existing {
                Ok(session) => return Ok(session),
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let id = id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        let now = Utc::now();

        conn.execute(
            "INSERT INTO chat_sessions (id, phone, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![id, phone, now.to_rfc3339()],
        )?;

        Ok(ChatSession {
            id,
            phone: phone.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    /// Add a message to a session
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn add_message(&self, session_id: &str, role: MessageRole, content: &str) -> Result<ChatMessage> {
        let conn = super::conn(&self.pool)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO chat_messages (id, session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, session_id, role.as_str(), content, now.to_rfc3339()],
        )?;
        conn.execute(
            "UPDATE chat_sessions SET updated_at = ?2 WHERE id = ?1",
            rusqlite::params![session_id, now.to_rfc3339()],
        )?;

        Ok(ChatMessage {
            id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Most recent `limit` messages, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let conn = super::conn(&self.pool)?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, created_at FROM (
                SELECT id, session_id, role, content, created_at, rowid AS seq FROM chat_messages
                WHERE session_id = ?1 ORDER BY seq DESC LIMIT ?2
             ) ORDER BY seq ASC",
        )?;

        let messages = stmt
            .query_map(rusqlite::params![session_id, limit], |row| {
                let role: String = row.get(2)?;
                Ok(ChatMessage {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: MessageRole::from_str(&role).unwrap_or(MessageRole::User),
                    content: row.get(3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                })
            })?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(messages)
    }

    /// Count messages in a session
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn message_count(&self, session_id: &str) -> Result<usize> {
        let conn = super::conn(&self.pool)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup() -> SessionRepo {
        SessionRepo::new(db::init_memory().unwrap())
    }

    #[test]
    fn test_find_or_create() {
        let repo = setup();
        let session = repo.find_or_create(None, Some("+15551112222")).unwrap();
        let again = repo.find_or_create(Some(&session.id), None).unwrap();
        assert_eq!(session.id, again.id);
        assert_eq!(again.phone.as_deref(), Some("+15551112222"));

        let named = repo.find_or_create(Some("web-1"), None).unwrap();
        assert_eq!(named.id, "web-1");
    }

    #[test]
    fn test_add_and_get_messages() {
        let repo = setup();
        let session = repo.find_or_create(None, None).unwrap();

        repo.add_message(&session.id, MessageRole::User, "Hello").unwrap();
        repo.add_message(&session.id, MessageRole::Assistant, "Hi there!").unwrap();
        repo.add_message(&session.id, MessageRole::User, "What are your hours?").unwrap();

        let messages = repo.get_messages(&session.id, 2).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hi there!");
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(repo.message_count(&session.id).unwrap(), 3);
    }
}
