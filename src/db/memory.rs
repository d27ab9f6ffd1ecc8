//! Memory record store
//!
//! Long-term records the agent can search while answering: contact cards,
//! facts about the owner's business and follow-up failures queued for review.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DbPool;
use crate::Result;

/// Category for contact cards (subject is the contact name)
pub const CATEGORY_CONTACT: &str = "contact";

/// Category for failed post-call follow-ups
pub const CATEGORY_FOLLOWUP_FAILURE: &str = "followup_failure";

/// Default importance for new records (0-10)
pub const DEFAULT_IMPORTANCE: i64 = 5;

/// Max rows returned by a single keyword search
const SEARCH_LIMIT: usize = 20;

/// A memory record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub category: String,
    pub subject: String,
    pub content: String,
    pub importance: i64,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a new record with default importance
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("mem_{}", Uuid::new_v4()),
            category: category.into(),
            subject: subject.into(),
            content: content.into(),
            importance: DEFAULT_IMPORTANCE,
            created_at: Utc::now(),
        }
    }

    /// Set the importance
    #[must_use]
    pub const fn with_importance(mut self, importance: i64) -> Self {
        self.importance = importance;
        self
    }
}

/// Partial update for a memory record
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub subject: Option<String>,
    pub content: Option<String>,
    pub importance: Option<i64>,
}

/// Searchable record store used by the agent pipeline
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Records whose subject or content contains `keyword`, most important first
    async fn search(&self, keyword: &str) -> Result<Vec<MemoryRecord>>;

    /// Store a new record
    async fn insert(&self, record: MemoryRecord) -> Result<()>;

    /// Apply a partial update; false if the id is unknown
    async fn update(&self, id: &str, update: MemoryUpdate) -> Result<bool>;
}

/// `SQLite`-backed memory store
#[derive(Debug, Clone)]
pub struct MemoryRepo {
    pool: DbPool,
}

impl MemoryRepo {
    /// Create a new memory repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Add a new record
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn add(&self, record: &MemoryRecord) -> Result<()> {
        let conn = super::conn(&self.pool)?;
        conn.execute(
            "INSERT INTO memories (id, category, subject, content, importance, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            rusqlite::params![
                record.id,
                record.category,
                record.subject,
                record.content,
                record.importance,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a record by id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let conn = super::conn(&self.pool)?;
        let result = conn.query_row(
            "SELECT id, category, subject, content, importance, created_at FROM memories WHERE id = ?1",
            [id],
            row_to_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Search by substring over subject and content
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn search_text(&self, keyword: &str) -> Result<Vec<MemoryRecord>> {
        let conn = super::conn(&self.pool)?;
        let pattern = format!("%{keyword}%");

        let mut stmt = conn.prepare(
            "SELECT id, category, subject, content, importance, created_at FROM memories
             WHERE content LIKE ?1 OR subject LIKE ?1
             ORDER BY importance DESC, created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![pattern, SEARCH_LIMIT], row_to_record)?;

        Ok(rows.flatten().collect())
    }

    /// List records in a category
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_category(&self, category: &str) -> Result<Vec<MemoryRecord>> {
        let conn = super::conn(&self.pool)?;
        let mut stmt = conn.prepare(
            "SELECT id, category, subject, content, importance, created_at FROM memories
             WHERE category = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([category], row_to_record)?;

        Ok(rows.flatten().collect())
    }

    /// Apply a partial update
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn apply_update(&self, id: &str, update: &MemoryUpdate) -> Result<bool> {
        let conn = super::conn(&self.pool)?;
        let changed = conn.execute(
            "UPDATE memories SET
                subject = COALESCE(?2, subject),
                content = COALESCE(?3, content),
                importance = COALESCE(?4, importance),
                updated_at = datetime('now')
             WHERE id = ?1",
            rusqlite::params![id, update.subject, update.content, update.importance],
        )?;
        Ok(changed > 0)
    }
}

#[async_trait]
impl MemoryStore for MemoryRepo {
    async fn search(&self, keyword: &str) -> Result<Vec<MemoryRecord>> {
        let repo = self.clone();
        let keyword = keyword.to_string();
        super::blocking(move || repo.search_text(&keyword)).await
    }

    async fn insert(&self, record: MemoryRecord) -> Result<()> {
        let repo = self.clone();
        super::blocking(move || repo.add(&record)).await
    }

    async fn update(&self, id: &str, update: MemoryUpdate) -> Result<bool> {
        let repo = self.clone();
        let id = id.to_string();
        super::blocking(move || repo.apply_update(&id, &update)).await
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    Ok(MemoryRecord {
        id: row.get(0)?,
        category: row.get(1)?,
        subject: row.get(2)?,
        content: row.get(3)?,
        importance: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_memory_crud() {
        let repo = MemoryRepo::new(db::init_memory().unwrap());

        let record = MemoryRecord::new(CATEGORY_CONTACT, "Dana Reyes", "Dana Reyes +15551230000");
        repo.add(&record).unwrap();

        let fetched = repo.get(&record.id).unwrap().unwrap();
        assert_eq!(fetched.subject, "Dana Reyes");
        assert_eq!(fetched.importance, DEFAULT_IMPORTANCE);

        let updated = repo
            .apply_update(
                &record.id,
                &MemoryUpdate {
                    importance: Some(9),
                    ..MemoryUpdate::default()
                },
            )
            .unwrap();
        assert!(updated);
        assert_eq!(repo.get(&record.id).unwrap().unwrap().importance, 9);
        assert!(!repo.apply_update("missing", &MemoryUpdate::default()).unwrap());
    }

    #[test]
    fn test_search_orders_by_importance() {
        let repo = MemoryRepo::new(db::init_memory().unwrap());
        repo.add(&MemoryRecord::new("fact", "pricing", "Pricing starts at $40").with_importance(3))
            .unwrap();
        repo.add(&MemoryRecord::new("fact", "pricing", "Pricing for rush jobs doubles").with_importance(8))
            .unwrap();
        repo.add(&MemoryRecord::new("fact", "hours", "Open nine to five")).unwrap();

        let found = repo.search_text("Pricing").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].importance, 8);

        assert_eq!(repo.list_category("fact").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_store_trait() {
        let repo = MemoryRepo::new(db::init_memory().unwrap());
        let store: &dyn MemoryStore = &repo;

        store
            .insert(MemoryRecord::new(CATEGORY_FOLLOWUP_FAILURE, "call-1", "sms and email failed"))
            .await
            .unwrap();
        let found = store.search("email failed").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category, CATEGORY_FOLLOWUP_FAILURE);
    }
}
