//! Per-session conversation memory.
//!
//! A [`MemoryStore`] owns one session's verbatim history window and rolling
//! summary. Pairs leaving the window are folded into the summary first, so
//! nothing the user said is dropped without a trace.
//!
//! Persistence through a [`TurnStore`] is optional and best effort: write
//! failures are logged and the in-process copy stays authoritative. The
//! stored summary records how many turns it covers, so a resumed session
//! puts every earlier turn in exactly one place: the summary or the window.

use std::collections::VecDeque;
use std::sync::Arc;

use chatloom_core::error::MemoryError;
use chatloom_core::message::SessionId;
use chatloom_core::session::{SessionSummary, TurnPair, TurnStore};
use tracing::{debug, warn};

use crate::context::token;
use crate::session::summarizer::{self, ExtractiveSummarizer, Summarizer};
use crate::settings::MemorySettings;

/// What an [`MemoryStore::append`] did besides storing the pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendReport {
    /// Pairs moved out of the verbatim window
    pub folded: usize,
    /// Whether the rolling summary was regenerated
    pub resummarized: bool,
}

pub struct MemoryStore {
    session: SessionId,
    settings: MemorySettings,
    history: VecDeque<TurnPair>,
    summary: String,
    /// Turns of this session that live only in `summary`
    folded_turns: usize,
    summarizer: Arc<dyn Summarizer>,
    persistence: Option<Arc<dyn TurnStore>>,
}

impl MemoryStore {
    pub fn new(session: SessionId, settings: MemorySettings, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            session,
            settings,
            history: VecDeque::new(),
            summary: String::new(),
            folded_turns: 0,
            summarizer,
            persistence: None,
        }
    }

    /// Write every appended pair and summary change through to `store`.
    pub fn with_persistence(mut self, store: Arc<dyn TurnStore>) -> Self {
        self.persistence = Some(store);
        self
    }

    /// Rehydrate a session from `store`: its latest summary plus every turn
    /// the summary does not cover yet. Further changes are written back to it.
    ///
    /// Uncovered turns that no longer fit the window (a crash between the
    /// turn write and the summary write, or a smaller window than before)
    /// are folded now, so none of them is lost or counted twice.
    pub async fn load(
        session: SessionId,
        settings: MemorySettings,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn TurnStore>,
    ) -> Result<Self, MemoryError> {
        let summary = store.get_summary(&session).await?.unwrap_or_default();
        let pending = store.turns_since(&session, summary.folded_turns).await?;

        let mut memory = Self {
            session,
            settings,
            history: VecDeque::from(pending),
            summary: summary.text,
            folded_turns: summary.folded_turns,
            summarizer,
            persistence: Some(store),
        };

        let evicted = memory.trim();
        if !evicted.is_empty() {
            let target = memory.summary_target();
            memory.fold(&evicted, target).await;
        }
        debug!(
            session_id = %memory.session,
            pairs = memory.history.len(),
            folded_turns = memory.folded_turns,
            folded_on_load = evicted.len(),
            "Session rehydrated"
        );
        Ok(memory)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    pub fn settings(&self) -> &MemorySettings {
        &self.settings
    }

    /// The verbatim window, oldest first.
    pub fn get_history(&self) -> &VecDeque<TurnPair> {
        &self.history
    }

    pub fn get_summary(&self) -> &str {
        &self.summary
    }

    /// Turns of this session covered only by the summary.
    pub fn folded_turns(&self) -> usize {
        self.folded_turns
    }

    /// Estimated tokens of summary + history.
    pub fn estimated_tokens(&self) -> usize {
        token::estimate_memory_tokens(&self.summary, &self.history)
    }

    /// Record a finished exchange.
    ///
    /// Afterwards the window holds at most `max_history_pairs` pairs, and the
    /// summary has been regenerated if the window overflowed or summary +
    /// history went over `context_token_budget`.
    pub async fn append(&mut self, user: &str, assistant: &str) -> AppendReport {
        if let Some(store) = &self.persistence
            && let Err(e) = store.append_turn(&self.session, user, assistant).await
        {
            warn!(session_id = %self.session, error = %e, "Failed to persist turn");
        }

        self.history.push_back(TurnPair::new(user, assistant));

        let budget = self.settings.context_token_budget;
        let target = self.summary_target();
        let evicted = self.trim();

        let over_budget = self.estimated_tokens() > budget;
        if evicted.is_empty() && !over_budget {
            return AppendReport::default();
        }

        self.fold(&evicted, target).await;
        debug!(
            session_id = %self.session,
            folded = evicted.len(),
            summary_tokens = token::estimate_tokens(&self.summary),
            "Rolling summary regenerated"
        );

        AppendReport {
            folded: evicted.len(),
            resummarized: true,
        }
    }

    /// Pop pairs off the front of the window until it fits, oldest first.
    fn trim(&mut self) -> Vec<TurnPair> {
        let budget = self.settings.context_token_budget;
        let target = self.summary_target();
        let mut evicted = Vec::new();

        while self.history.len() > self.settings.max_history_pairs {
            evicted.extend(self.history.pop_front());
        }
        // Keep the newest pair verbatim; older ones go if the window alone
        // would crowd out the summary.
        while self.history.len() > 1 && target + token::estimate_memory_tokens("", &self.history) > budget {
            evicted.extend(self.history.pop_front());
        }
        evicted
    }

    fn summary_target(&self) -> usize {
        (self.settings.context_token_budget / 2).max(1)
    }

    async fn fold(&mut self, evicted: &[TurnPair], target: usize) {
        let summary = match self.summarizer.summarize(&self.summary, evicted, target).await {
            Ok(summary) => summarizer::clip(&summary, target),
            Err(e) => {
                warn!(
                    session_id = %self.session,
                    summarizer = self.summarizer.name(),
                    error = %e,
                    "Summarizer failed, using extractive summary"
                );
                ExtractiveSummarizer::fold(&self.summary, evicted, target)
            }
        };
        self.summary = summary;
        self.folded_turns += evicted.len();

        let record = SessionSummary::new(self.summary.clone(), self.folded_turns);
        if let Some(store) = &self.persistence
            && let Err(e) = store.update_summary(&self.session, &record).await
        {
            warn!(session_id = %self.session, error = %e, "Failed to persist summary");
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("session", &self.session)
            .field("history", &self.history.len())
            .field("summary_chars", &self.summary.len())
            .field("folded_turns", &self.folded_turns)
            .field("summarizer", &self.summarizer.name())
            .finish()
    }
}
