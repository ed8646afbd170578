//! Session bookkeeping: one [`MemoryStore`] per session id.
//!
//! Each store sits behind its own async mutex, so turns within a session run
//! one after another while different sessions proceed concurrently. The
//! session map is only locked to find or reserve a slot; loading a session
//! from the turn store happens outside that lock.

use std::collections::HashMap;
use std::sync::Arc;

use chatloom_core::message::SessionId;
use chatloom_core::session::TurnStore;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::orchestrator::Orchestrator;
use crate::session::store::MemoryStore;
use crate::session::summarizer::Summarizer;
use crate::settings::MemorySettings;
use crate::state::FinalResult;

/// Filled once, by whichever caller first opens the session.
type SessionSlot = Arc<OnceCell<Arc<Mutex<MemoryStore>>>>;

pub struct SessionManager {
    orchestrator: Arc<Orchestrator>,
    settings: MemorySettings,
    summarizer: Arc<dyn Summarizer>,
    turn_store: Option<Arc<dyn TurnStore>>,
    sessions: Mutex<HashMap<SessionId, SessionSlot>>,
}

impl SessionManager {
    pub fn new(orchestrator: Arc<Orchestrator>, settings: MemorySettings, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            orchestrator,
            settings,
            summarizer,
            turn_store: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Rehydrate sessions from, and persist them to, `store`.
    pub fn with_turn_store(mut self, store: Arc<dyn TurnStore>) -> Self {
        self.turn_store = Some(store);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Number of sessions opened by this process.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// The memory of `session`, created (or loaded from the turn store) on
    /// first use.
    pub async fn session(&self, session: &SessionId) -> Arc<Mutex<MemoryStore>> {
        let slot = self.sessions.lock().await.entry(session.clone()).or_default().clone();

        // Concurrent first uses of one session wait here for a single load.
        slot.get_or_init(|| async { Arc::new(Mutex::new(self.open(session).await)) })
            .await
            .clone()
    }

    async fn open(&self, session: &SessionId) -> MemoryStore {
        let fresh = || MemoryStore::new(session.clone(), self.settings.clone(), self.summarizer.clone());

        let Some(store) = &self.turn_store else {
            return fresh();
        };
        match MemoryStore::load(session.clone(), self.settings.clone(), self.summarizer.clone(), store.clone()).await {
            Ok(memory) => memory,
            Err(e) => {
                warn!(session_id = %session, error = %e, "Could not load session, starting empty");
                fresh().with_persistence(store.clone())
            }
        }
    }

    /// Run one turn in `session`.
    pub async fn run_turn(&self, session: &SessionId, user_message: &str) -> FinalResult {
        let handle = self.session(session).await;
        let mut memory = handle.lock().await;
        debug!(session_id = %session, "Session locked for turn");
        self.orchestrator.run_turn(user_message, &mut memory).await
    }

    /// Run one turn and return the text to show: the answer, or `Error: …`.
    pub async fn chat(&self, session: &SessionId, user_message: &str) -> String {
        self.run_turn(session, user_message).await.into_display()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ExtractiveSummarizer;
    use crate::settings::AgentSettings;
    use crate::testing::ScriptedProvider;
    use chatloom_core::profile::UserProfile;
    use chatloom_core::tool::ToolRegistry;
    use async_trait::async_trait;
    use chatloom_core::error::MemoryError;
    use chatloom_core::session::{SessionSummary, TurnPair};
    use chatloom_memory::InMemoryTurnStore;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn manager(provider: Arc<ScriptedProvider>) -> SessionManager {
        let orchestrator = Orchestrator::new(
            provider,
            Arc::new(ToolRegistry::new()),
            UserProfile::default().shared(),
            AgentSettings::default(),
        );
        SessionManager::new(Arc::new(orchestrator), MemorySettings::default(), Arc::new(ExtractiveSummarizer))
    }

    #[tokio::test]
    async fn sessions_do_not_share_history() {
        let provider = Arc::new(ScriptedProvider::with_texts(&["one", "two"]));
        let manager = manager(provider.clone());
        let alice = SessionId::from("alice");
        let bob = SessionId::from("bob");

        assert_eq!(manager.chat(&alice, "I am Alice").await, "one");
        assert_eq!(manager.chat(&bob, "I am Bob").await, "two");
        assert_eq!(manager.session_count().await, 2);

        assert!(!provider.context_of(1).contains("I am Alice"));
        let bob_memory = manager.session(&bob).await;
        assert_eq!(bob_memory.lock().await.get_history()[0].user, "I am Bob");
    }

    #[tokio::test]
    async fn errors_are_rendered_as_text() {
        let manager = manager(Arc::new(ScriptedProvider::new(Vec::new())));
        let reply = manager.chat(&SessionId::from("s"), "hi").await;
        assert!(reply.starts_with("Error: LLM invocation failed"));
    }

    #[tokio::test]
    async fn sessions_resume_from_turn_store() {
        let turns: Arc<dyn TurnStore> = Arc::new(InMemoryTurnStore::new());
        let session = SessionId::from("resume-me");

        let first = manager(Arc::new(ScriptedProvider::with_texts(&["Noted, you like tea."]))).with_turn_store(turns.clone());
        first.chat(&session, "I like tea").await;

        let provider = Arc::new(ScriptedProvider::with_texts(&["You like tea."]));
        let second = manager(provider.clone()).with_turn_store(turns);
        assert_eq!(second.chat(&session, "What do I like?").await, "You like tea.");
        assert!(provider.context_of(0).contains("user: I like tea"));
    }

    /// Turn store whose loads of session "slow" block until released.
    struct GatedStore {
        inner: InMemoryTurnStore,
        loading: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TurnStore for GatedStore {
        fn name(&self) -> &str {
            "gated"
        }

        async fn append_turn(&self, session: &SessionId, user: &str, assistant: &str) -> Result<(), MemoryError> {
            self.inner.append_turn(session, user, assistant).await
        }

        async fn recent_turns(&self, session: &SessionId, limit: usize) -> Result<Vec<TurnPair>, MemoryError> {
            self.inner.recent_turns(session, limit).await
        }

        async fn turns_since(&self, session: &SessionId, skip: usize) -> Result<Vec<TurnPair>, MemoryError> {
            if session.as_str() == "slow" {
                self.loading.notify_one();
                self.release.notified().await;
            }
            self.inner.turns_since(session, skip).await
        }

        async fn get_summary(&self, session: &SessionId) -> Result<Option<SessionSummary>, MemoryError> {
            self.inner.get_summary(session).await
        }

        async fn update_summary(&self, session: &SessionId, summary: &SessionSummary) -> Result<(), MemoryError> {
            self.inner.update_summary(session, summary).await
        }
    }

    #[tokio::test]
    async fn loading_one_session_does_not_block_others() {
        let store = Arc::new(GatedStore {
            inner: InMemoryTurnStore::new(),
            loading: Notify::new(),
            release: Notify::new(),
        });
        let manager = manager(Arc::new(ScriptedProvider::with_texts(&["one", "two", "three"])))
            .with_turn_store(store.clone());
        let fast = SessionId::from("fast");
        let slow = SessionId::from("slow");

        assert_eq!(manager.chat(&fast, "hi").await, "one");

        let (slow_reply, fast_reply) = tokio::join!(manager.chat(&slow, "hello"), async {
            store.loading.notified().await;
            // "slow" is mid-load here; "fast" must still get through.
            let reply = tokio::time::timeout(Duration::from_secs(5), manager.chat(&fast, "again")).await;
            store.release.notify_one();
            reply
        });

        assert_eq!(fast_reply.expect("fast session was blocked by a loading session"), "two");
        assert_eq!(slow_reply, "three");
        assert_eq!(manager.session_count().await, 2);
    }
}
