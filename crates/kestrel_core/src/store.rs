//! Conversation store - the append-only exchange log.
//!
//! One SQLite connection opened at construction (WAL mode), shared behind a
//! mutex; all database work runs on the blocking pool.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::StoreError;

/// One logged (user utterance, assistant reply) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub id: i64,
    pub user_text: String,
    /// Filled exactly once when the orchestration round completes.
    pub assistant_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Serialization formats for `export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Human-readable table.
    Text,
    /// Comma-separated values.
    Csv,
    /// JSON array of exchanges.
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Text => "text",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ExportFormat::Text),
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Append-only log of conversation exchanges. Cloning shares the same
/// underlying connection.
#[derive(Clone)]
pub struct ConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl ConversationStore {
    /// Open or create the database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        info!("Opening conversation database at {}", path.display());

        let path = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&path).context("Failed to open SQLite database")?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .context("Failed to enable WAL mode")?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .context("Failed to set synchronous mode")?;

            Ok(conn)
        })
        .await??;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// In-memory database, for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.blocking_lock();
            conn.execute(
                "CREATE TABLE IF NOT EXISTS conversations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user TEXT NOT NULL,
                    assistant TEXT,
                    timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
                )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_conversations_timestamp
                 ON conversations(timestamp)",
                [],
            )?;
            Ok(())
        })
        .await?
    }

    /// Create a draft exchange with no reply yet. Returns its id.
    pub async fn append(&self, user_text: &str) -> Result<i64, StoreError> {
        let conn = Arc::clone(&self.conn);
        let user_text = user_text.to_string();

        tokio::task::spawn_blocking(move || -> Result<i64, StoreError> {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO conversations (user, assistant, timestamp) VALUES (?1, NULL, ?2)",
                params![user_text, Utc::now().to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?
    }

    /// Fill in the reply for a draft exchange. A reply, once set, is final.
    pub async fn complete(&self, id: i64, assistant_text: &str) -> Result<(), StoreError> {
        let conn = Arc::clone(&self.conn);
        let assistant_text = assistant_text.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = conn.blocking_lock();
            let changed = conn.execute(
                "UPDATE conversations SET assistant = ?1 WHERE id = ?2 AND assistant IS NULL",
                params![assistant_text, id],
            )?;
            if changed == 1 {
                return Ok(());
            }

            let exists = conn
                .query_row(
                    "SELECT COUNT(*) FROM conversations WHERE id = ?1",
                    params![id],
                    |row| row.get::<_, i64>(0),
                )?
                > 0;

            if exists {
                Err(StoreError::AlreadyCompleted(id))
            } else {
                Err(StoreError::NotFound(id))
            }
        })
        .await?
    }

    /// The most recent `limit` completed exchanges, reordered oldest-first.
    pub async fn recent_history(&self, limit: usize) -> Result<Vec<Exchange>, StoreError> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> Result<Vec<Exchange>, StoreError> {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT id, user, assistant, timestamp FROM (
                     SELECT id, user, assistant, timestamp
                     FROM conversations
                     WHERE assistant IS NOT NULL
                     ORDER BY id DESC
                     LIMIT ?1
                 ) ORDER BY id ASC",
            )?;

            let rows = stmt.query_map(params![limit as i64], row_to_exchange)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await?
    }

    /// Case-insensitive substring search over both sides, newest-first.
    pub async fn search(&self, keyword: &str) -> Result<Vec<Exchange>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let pattern = format!("%{}%", keyword);

        tokio::task::spawn_blocking(move || -> Result<Vec<Exchange>, StoreError> {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT id, user, assistant, timestamp
                 FROM conversations
                 WHERE user LIKE ?1 OR assistant LIKE ?1
                 ORDER BY id DESC",
            )?;

            let rows = stmt.query_map(params![pattern], row_to_exchange)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await?
    }

    /// Serialize exchanges created within the inclusive date range.
    pub async fn export(
        &self,
        format: ExportFormat,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<String, StoreError> {
        let conn = Arc::clone(&self.conn);

        let exchanges = tokio::task::spawn_blocking(move || -> Result<Vec<Exchange>, StoreError> {
            let conn = conn.blocking_lock();

            let mut sql = String::from(
                "SELECT id, user, assistant, timestamp FROM conversations WHERE 1=1",
            );
            let mut args: Vec<String> = Vec::new();

            if let Some(start) = start_date {
                sql.push_str(&format!(" AND DATE(timestamp) >= DATE(?{})", args.len() + 1));
                args.push(start.to_string());
            }
            if let Some(end) = end_date {
                sql.push_str(&format!(" AND DATE(timestamp) <= DATE(?{})", args.len() + 1));
                args.push(end.to_string());
            }
            sql.push_str(" ORDER BY id ASC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), row_to_exchange)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await??;

        Ok(render_export(format, &exchanges))
    }
}

fn row_to_exchange(row: &rusqlite::Row<'_>) -> rusqlite::Result<Exchange> {
    let timestamp_str: String = row.get(3)?;
    let created_at = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Exchange {
        id: row.get(0)?,
        user_text: row.get(1)?,
        assistant_text: row.get(2)?,
        created_at,
    })
}

fn render_export(format: ExportFormat, exchanges: &[Exchange]) -> String {
    match format {
        ExportFormat::Text => {
            let mut out = String::new();
            for ex in exchanges {
                out.push_str(&format!(
                    "[{}] #{}\n  user: {}\n  kestrel: {}\n",
                    ex.created_at.format("%Y-%m-%d %H:%M:%S"),
                    ex.id,
                    ex.user_text,
                    ex.assistant_text.as_deref().unwrap_or("-")
                ));
            }
            out
        }
        ExportFormat::Csv => {
            let mut out = String::from("id,timestamp,user,assistant\n");
            for ex in exchanges {
                out.push_str(&format!(
                    "{},{},{},{}\n",
                    ex.id,
                    csv_field(&ex.created_at.to_rfc3339()),
                    csv_field(&ex.user_text),
                    csv_field(ex.assistant_text.as_deref().unwrap_or(""))
                ));
            }
            out
        }
        ExportFormat::Json => {
            serde_json::to_string_pretty(exchanges).unwrap_or_else(|_| "[]".to_string())
        }
    }
}

/// Quote a CSV field, doubling embedded quotes.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_complete_roundtrip() {
        let store = ConversationStore::open_in_memory().await.unwrap();

        let id = store.append("what's 2+2").await.unwrap();
        store.complete(id, "4").await.unwrap();

        let history = store.recent_history(1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_text, "what's 2+2");
        assert_eq!(history[0].assistant_text.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_complete_unknown_id() {
        let store = ConversationStore::open_in_memory().await.unwrap();
        let err = store.complete(42, "hello").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(42)));
    }

    #[tokio::test]
    async fn test_complete_is_final() {
        let store = ConversationStore::open_in_memory().await.unwrap();
        let id = store.append("hi").await.unwrap();
        store.complete(id, "hello").await.unwrap();

        let err = store.complete(id, "other").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyCompleted(_)));

        let history = store.recent_history(1).await.unwrap();
        assert_eq!(history[0].assistant_text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_recent_history_skips_drafts_and_windows() {
        let store = ConversationStore::open_in_memory().await.unwrap();

        for i in 0..5 {
            let id = store.append(&format!("question {}", i)).await.unwrap();
            store.complete(id, &format!("answer {}", i)).await.unwrap();
        }
        // A draft with no reply stays out of history.
        store.append("pending").await.unwrap();

        let history = store.recent_history(3).await.unwrap();
        assert_eq!(history.len(), 3);
        // Most recent three, oldest first.
        assert_eq!(history[0].user_text, "question 2");
        assert_eq!(history[2].user_text, "question 4");
    }

    #[tokio::test]
    async fn test_recent_history_is_idempotent() {
        let store = ConversationStore::open_in_memory().await.unwrap();
        let id = store.append("hi").await.unwrap();
        store.complete(id, "hello").await.unwrap();

        let a = store.recent_history(10).await.unwrap();
        let b = store.recent_history(10).await.unwrap();
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[0].assistant_text, b[0].assistant_text);
    }

    #[tokio::test]
    async fn test_search_matches_either_side() {
        let store = ConversationStore::open_in_memory().await.unwrap();

        let id = store.append("open chrome").await.unwrap();
        store.complete(id, "Done.").await.unwrap();
        let id = store.append("what's the weather").await.unwrap();
        store.complete(id, "Sunny with some Chrome-colored clouds.").await.unwrap();

        let hits = store.search("chrome").await.unwrap();
        assert_eq!(hits.len(), 2);
        // Newest first.
        assert_eq!(hits[0].user_text, "what's the weather");
    }

    #[tokio::test]
    async fn test_export_formats() {
        let store = ConversationStore::open_in_memory().await.unwrap();
        let id = store.append("say \"hi\", please").await.unwrap();
        store.complete(id, "hi").await.unwrap();

        let csv = store.export(ExportFormat::Csv, None, None).await.unwrap();
        assert!(csv.starts_with("id,timestamp,user,assistant\n"));
        assert!(csv.contains("\"say \"\"hi\"\", please\""));

        let json = store.export(ExportFormat::Json, None, None).await.unwrap();
        let parsed: Vec<Exchange> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].assistant_text.as_deref(), Some("hi"));

        let text = store.export(ExportFormat::Text, None, None).await.unwrap();
        assert!(text.contains("user: say \"hi\", please"));
    }

    #[tokio::test]
    async fn test_export_date_range_is_inclusive() {
        let store = ConversationStore::open_in_memory().await.unwrap();
        let id = store.append("hello").await.unwrap();
        store.complete(id, "hi").await.unwrap();

        let today = Utc::now().date_naive();

        let hit = store
            .export(ExportFormat::Csv, Some(today), Some(today))
            .await
            .unwrap();
        assert!(hit.contains("hello"));

        let miss = store
            .export(
                ExportFormat::Csv,
                Some(today + chrono::Duration::days(1)),
                None,
            )
            .await
            .unwrap();
        assert!(!miss.contains("hello"));
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
