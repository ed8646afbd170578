//! SQLite storage: turn persistence plus an FTS5 search index.
//!
//! One database file, five objects:
//! - `chat_turns`: every finished turn, per session, in insertion order
//! - `chat_summaries`: the latest rolling summary of each session and how
//!   many of its turns the summary covers
//! - `user_profile`: the single user profile, as JSON
//! - `memories`: indexed turn texts
//! - `memories_fts`: FTS5 virtual table over `memories`, kept in sync by triggers

use crate::in_memory::terms;
use async_trait::async_trait;
use chatloom_core::error::MemoryError;
use chatloom_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use chatloom_core::message::SessionId;
use chatloom_core::profile::{ProfileStore, UserProfile};
use chatloom_core::session::{SessionSummary, TurnPair, TurnStore};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// SQLite-backed [`TurnStore`], [`ProfileStore`] and [`MemoryBackend`]
/// sharing one pool.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and run migrations.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        let statements: [(&str, &str); 8] = [
            (
                "chat_turns table",
                r#"
                CREATE TABLE IF NOT EXISTS chat_turns (
                    id             INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id     TEXT NOT NULL,
                    user_text      TEXT NOT NULL,
                    assistant_text TEXT NOT NULL,
                    created_at     TEXT NOT NULL
                )
                "#,
            ),
            (
                "chat_turns index",
                "CREATE INDEX IF NOT EXISTS idx_chat_turns_session ON chat_turns(session_id, id)",
            ),
            (
                "chat_summaries table",
                r#"
                CREATE TABLE IF NOT EXISTS chat_summaries (
                    session_id   TEXT PRIMARY KEY,
                    summary      TEXT NOT NULL,
                    folded_turns INTEGER NOT NULL DEFAULT 0,
                    updated_at   TEXT NOT NULL
                )
                "#,
            ),
            (
                "user_profile table",
                r#"
                CREATE TABLE IF NOT EXISTS user_profile (
                    id         INTEGER PRIMARY KEY CHECK (id = 1),
                    profile    TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "memories table",
                r#"
                CREATE TABLE IF NOT EXISTS memories (
                    iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                    id         TEXT UNIQUE NOT NULL,
                    content    TEXT NOT NULL,
                    source     TEXT,
                    created_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "FTS5 table",
                r#"
                CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
                    content,
                    content='memories',
                    content_rowid='iid',
                    tokenize='porter unicode61'
                )
                "#,
            ),
            (
                "insert trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
                    INSERT INTO memories_fts(rowid, content) VALUES (new.iid, new.content);
                END
                "#,
            ),
            (
                "delete trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
                    INSERT INTO memories_fts(memories_fts, rowid, content)
                    VALUES ('delete', old.iid, old.content);
                END
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Build an FTS5 query that matches any of the terms in `text`.
    ///
    /// Every term is quoted so user text can never inject FTS syntax.
    fn fts_query(text: &str) -> String {
        terms(text)
            .into_iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    fn parse_time(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<TurnPair, MemoryError> {
        let column = |e: sqlx::Error| MemoryError::QueryFailed(format!("chat_turns row: {e}"));
        let created_at: String = row.try_get("created_at").map_err(column)?;
        Ok(TurnPair {
            user: row.try_get("user_text").map_err(column)?,
            assistant: row.try_get("assistant_text").map_err(column)?,
            created_at: Self::parse_time(&created_at),
        })
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryEntry, MemoryError> {
        let column = |e: sqlx::Error| MemoryError::QueryFailed(format!("memories row: {e}"));
        let created_at: String = row.try_get("created_at").map_err(column)?;
        Ok(MemoryEntry {
            id: row.try_get("id").map_err(column)?,
            content: row.try_get("content").map_err(column)?,
            source: row.try_get("source").map_err(column)?,
            created_at: Self::parse_time(&created_at),
            score: 0.0,
        })
    }
}

#[async_trait]
impl TurnStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append_turn(&self, session: &SessionId, user: &str, assistant: &str) -> Result<(), MemoryError> {
        sqlx::query(
            "INSERT INTO chat_turns (session_id, user_text, assistant_text, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session.as_str())
        .bind(user)
        .bind(assistant)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("append turn: {e}")))?;
        Ok(())
    }

    async fn recent_turns(&self, session: &SessionId, limit: usize) -> Result<Vec<TurnPair>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT user_text, assistant_text, created_at FROM chat_turns
            WHERE session_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(session.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("recent turns: {e}")))?;

        let mut turns = rows.iter().map(Self::row_to_turn).collect::<Result<Vec<_>, MemoryError>>()?;
        turns.reverse();
        Ok(turns)
    }

    async fn turns_since(&self, session: &SessionId, skip: usize) -> Result<Vec<TurnPair>, MemoryError> {
        // LIMIT -1 means "no limit" in SQLite; OFFSET needs a LIMIT clause.
        let rows = sqlx::query(
            r#"
            SELECT user_text, assistant_text, created_at FROM chat_turns
            WHERE session_id = ?1
            ORDER BY id ASC
            LIMIT -1 OFFSET ?2
            "#,
        )
        .bind(session.as_str())
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("turns since: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn get_summary(&self, session: &SessionId) -> Result<Option<SessionSummary>, MemoryError> {
        let row = sqlx::query("SELECT summary, folded_turns FROM chat_summaries WHERE session_id = ?1")
            .bind(session.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("get summary: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let column = |e: sqlx::Error| MemoryError::QueryFailed(format!("chat_summaries row: {e}"));
        let folded: i64 = row.try_get("folded_turns").map_err(column)?;
        Ok(Some(SessionSummary {
            text: row.try_get("summary").map_err(column)?,
            folded_turns: usize::try_from(folded).unwrap_or(0),
        }))
    }

    async fn update_summary(&self, session: &SessionId, summary: &SessionSummary) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO chat_summaries (session_id, summary, folded_turns, updated_at) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(session_id) DO UPDATE SET
                summary = excluded.summary,
                folded_turns = excluded.folded_turns,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session.as_str())
        .bind(&summary.text)
        .bind(summary.folded_turns as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("update summary: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load_profile(&self) -> Result<Option<UserProfile>, MemoryError> {
        let row = sqlx::query("SELECT profile FROM user_profile WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("load profile: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row
            .try_get("profile")
            .map_err(|e| MemoryError::QueryFailed(format!("profile column: {e}")))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| MemoryError::QueryFailed(format!("stored profile is not valid JSON: {e}")))
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), MemoryError> {
        let raw = serde_json::to_string(profile).map_err(|e| MemoryError::Storage(format!("encode profile: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO user_profile (id, profile, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                profile = excluded.profile,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(raw)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("save profile: {e}")))?;
        debug!("User profile saved");
        Ok(())
    }
}

#[async_trait]
impl MemoryBackend for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }

        sqlx::query(
            r#"
            INSERT INTO memories (id, content, source, created_at) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.content)
        .bind(&entry.source)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!(id = %entry.id, "Indexed memory");
        Ok(entry.id)
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
        let fts_query = Self::fts_query(&query.text);

        if fts_query.is_empty() {
            let rows = sqlx::query("SELECT * FROM memories ORDER BY iid DESC LIMIT ?1")
                .bind(query.limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| MemoryError::QueryFailed(format!("recent memories: {e}")))?;
            return rows.iter().map(Self::row_to_entry).collect();
        }

        let rows = sqlx::query(
            r#"
            SELECT m.*, bm25(memories_fts) AS rank
            FROM memories_fts f
            JOIN memories m ON m.iid = f.rowid
            WHERE memories_fts MATCH ?1
            ORDER BY rank
            LIMIT ?2
            "#,
        )
        .bind(&fts_query)
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("FTS5 search: {e}")))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut entry = Self::row_to_entry(row)?;
            // bm25() is negative, lower is better
            let rank: f64 = row.try_get("rank").unwrap_or(0.0);
            entry.score = (-rank) as f32;
            if entry.score >= query.min_score {
                results.push(entry);
            }
        }
        Ok(results)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("count: {e}")))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| MemoryError::QueryFailed(format!("count column: {e}")))?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM memories")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("clear: {e}")))?;
        Ok(())
    }
}
