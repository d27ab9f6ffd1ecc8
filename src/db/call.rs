//! Call transcript and cross-call summary persistence

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::DbPool;
use super::memory::parse_datetime;
use crate::Result;
use crate::call::{Transcript, TranscriptEntry};

/// Persists what happened on calls
#[async_trait]
pub trait CallStore: Send + Sync {
    /// Store a sealed transcript (replaces any earlier copy)
    async fn save_transcript(&self, transcript: &Transcript) -> Result<()>;

    /// Load a transcript by call id
    async fn load_transcript(&self, call_id: &str) -> Result<Option<Transcript>>;

    /// Store a condensed summary for a caller's phone number
    async fn save_summary(&self, phone: &str, call_id: &str, summary: &str) -> Result<()>;

    /// Most recent summary for a phone number
    async fn latest_summary(&self, phone: &str) -> Result<Option<String>>;
}

/// `SQLite`-backed call store
#[derive(Debug, Clone)]
pub struct CallRepo {
    pool: DbPool,
}

impl CallRepo {
    /// Create a new call repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a transcript
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the database operation fails
    pub fn put_transcript(&self, transcript: &Transcript) -> Result<()> {
        let conn = super::conn(&self.pool)?;
        let entries = serde_json::to_string(&transcript.entries)?;
        let duration = i64::try_from(transcript.duration_secs).unwrap_or(i64::MAX);

        conn.execute(
            "INSERT OR REPLACE INTO transcripts (call_id, stream_id, caller_phone, started_at, duration_secs, entries)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                transcript.call_id,
                transcript.stream_id,
                transcript.caller_phone,
                transcript.started_at.to_rfc3339(),
                duration,
                entries,
            ],
        )?;

        tracing::debug!(call_id = %transcript.call_id, entries = transcript.entries.len(), "transcript saved");
        Ok(())
    }

    /// Fetch a transcript
    ///
    /// # Errors
    ///
    /// Returns error if the database operation or decoding fails
    pub fn get_transcript(&self, call_id: &str) -> Result<Option<Transcript>> {
        let conn = super::conn(&self.pool)?;
        let row = conn.query_row(
            "SELECT call_id, stream_id, caller_phone, started_at, duration_secs, entries
             FROM transcripts WHERE call_id = ?1",
            [call_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        );

        let (call_id, stream_id, caller_phone, started_at, duration, entries) = match row {
            Ok(r) => r,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entries: Vec<TranscriptEntry> = serde_json::from_str(&entries)?;
        Ok(Some(Transcript {
            call_id,
            stream_id,
            caller_phone,
            started_at: parse_datetime(&started_at),
            duration_secs: u64::try_from(duration).unwrap_or(0),
            entries,
        }))
    }

    /// Append a summary row
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn put_summary(&self, phone: &str, call_id: &str, summary: &str) -> Result<()> {
        let conn = super::conn(&self.pool)?;
        conn.execute(
            "INSERT INTO call_summaries (id, phone, call_id, summary, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                phone,
                call_id,
                summary,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Newest summary for a phone
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get_latest_summary(&self, phone: &str) -> Result<Option<String>> {
        let conn = super::conn(&self.pool)?;
        let result = conn.query_row(
            "SELECT summary FROM call_summaries WHERE phone = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
            [phone],
            |row| row.get(0),
        );

        match result {
            Ok(summary) => Ok(Some(summary)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CallStore for CallRepo {
    async fn save_transcript(&self, transcript: &Transcript) -> Result<()> {
        let repo = self.clone();
        let transcript = transcript.clone();
        super::blocking(move || repo.put_transcript(&transcript)).await
    }

    async fn load_transcript(&self, call_id: &str) -> Result<Option<Transcript>> {
        let repo = self.clone();
        let call_id = call_id.to_string();
        super::blocking(move || repo.get_transcript(&call_id)).await
    }

    async fn save_summary(&self, phone: &str, call_id: &str, summary: &str) -> Result<()> {
        let repo = self.clone();
        let (phone, call_id, summary) = (phone.to_string(), call_id.to_string(), summary.to_string());
        super::blocking(move || repo.put_summary(&phone, &call_id, &summary)).await
    }

    async fn latest_summary(&self, phone: &str) -> Result<Option<String>> {
        let repo = self.clone();
        let phone = phone.to_string();
        super::blocking(move || repo.get_latest_summary(&phone)).await
    }
}
