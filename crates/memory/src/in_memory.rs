//! In-memory backends: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chatloom_core::error::MemoryError;
use chatloom_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use chatloom_core::message::SessionId;
use chatloom_core::profile::{ProfileStore, UserProfile};
use chatloom_core::session::{SessionSummary, TurnPair, TurnStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A keyword index over a Vec of entries.
///
/// An entry's score is the fraction of distinct query terms it contains,
/// so a sentence-shaped query still matches partially.
pub struct InMemoryBackend {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercased alphanumeric terms of `text`, without duplicates.
pub(crate) fn terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.len() < 2 {
            continue;
        }
        let word = word.to_lowercase();
        if !out.contains(&word) {
            out.push(word);
        }
    }
    out
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str { "in_memory" }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
        Ok(id)
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
        let entries = self.entries.read().await;
        let wanted = terms(&query.text);

        if wanted.is_empty() {
            // Empty query: most recent first
            return Ok(entries.iter().rev().take(query.limit).cloned().collect());
        }

        let mut results: Vec<MemoryEntry> = entries
            .iter()
            .filter_map(|e| {
                let have = terms(&e.content);
                let hits = wanted.iter().filter(|t| have.contains(t)).count();
                if hits == 0 {
                    return None;
                }
                let mut e = e.clone();
                e.score = hits as f32 / wanted.len() as f32;
                Some(e)
            })
            .filter(|e| e.score >= query.min_score)
            .collect();

        // Stable sort keeps insertion order among equal scores; newer wins ties.
        results.reverse();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(query.limit);

        Ok(results)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[derive(Default)]
struct SessionRecord {
    turns: Vec<TurnPair>,
    summary: Option<SessionSummary>,
}

/// Turn persistence held in process memory.
#[derive(Default)]
pub struct InMemoryTurnStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl InMemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TurnStore for InMemoryTurnStore {
    fn name(&self) -> &str { "in_memory" }

    async fn append_turn(&self, session: &SessionId, user: &str, assistant: &str) -> Result<(), MemoryError> {
        self.sessions
            .write()
            .await
            .entry(session.clone())
            .or_default()
            .turns
            .push(TurnPair::new(user, assistant));
        Ok(())
    }

    async fn recent_turns(&self, session: &SessionId, limit: usize) -> Result<Vec<TurnPair>, MemoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session)
            .map(|r| {
                let skip = r.turns.len().saturating_sub(limit);
                r.turns[skip..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn turns_since(&self, session: &SessionId, skip: usize) -> Result<Vec<TurnPair>, MemoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session)
            .map(|r| r.turns.iter().skip(skip).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_summary(&self, session: &SessionId) -> Result<Option<SessionSummary>, MemoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session)
            .and_then(|r| r.summary.clone()))
    }

    async fn update_summary(&self, session: &SessionId, summary: &SessionSummary) -> Result<(), MemoryError> {
        self.sessions
            .write()
            .await
            .entry(session.clone())
            .or_default()
            .summary = Some(summary.clone());
        Ok(())
    }
}

/// Profile persistence held in process memory.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profile: RwLock<Option<UserProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    fn name(&self) -> &str { "in_memory" }

    async fn load_profile(&self) -> Result<Option<UserProfile>, MemoryError> {
        Ok(self.profile.read().await.clone())
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), MemoryError> {
        *self.profile.write().await = Some(profile.clone());
        Ok(())
    }
}
