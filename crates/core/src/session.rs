//! Persistence of finished turns and rolling summaries.
//!
//! The in-process session memory is authoritative while the process runs;
//! a [`TurnStore`] keeps a durable copy so a session can be resumed later.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::SessionId;

/// One completed exchange: what the user said and what the assistant answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnPair {
    pub user: String,
    pub assistant: String,
    pub created_at: DateTime<Utc>,
}

impl TurnPair {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            created_at: Utc::now(),
        }
    }

    /// The form a pair takes in the search index.
    pub fn index_text(&self) -> String {
        format!("user: {}, assistant: {}", self.user, self.assistant)
    }
}

/// A session's rolling summary and how many of its turns it covers.
///
/// Turns are numbered in insertion order, so the first `folded_turns` turns
/// live only in `text` and every later turn belongs to the verbatim window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub text: String,
    pub folded_turns: usize,
}

impl SessionSummary {
    pub fn new(text: impl Into<String>, folded_turns: usize) -> Self {
        Self {
            text: text.into(),
            folded_turns,
        }
    }
}

/// Durable storage for chat turns and the latest summary of each session.
///
/// Implementations: in-memory, SQLite.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Persist a finished turn.
    async fn append_turn(&self, session: &SessionId, user: &str, assistant: &str) -> std::result::Result<(), MemoryError>;

    /// The most recent `limit` turns, oldest first.
    async fn recent_turns(&self, session: &SessionId, limit: usize) -> std::result::Result<Vec<TurnPair>, MemoryError>;

    /// Every turn after the first `skip`, oldest first.
    async fn turns_since(&self, session: &SessionId, skip: usize) -> std::result::Result<Vec<TurnPair>, MemoryError>;

    /// The latest rolling summary, if one was ever written.
    async fn get_summary(&self, session: &SessionId) -> std::result::Result<Option<SessionSummary>, MemoryError>;

    /// Replace the rolling summary.
    async fn update_summary(&self, session: &SessionId, summary: &SessionSummary) -> std::result::Result<(), MemoryError>;
}
