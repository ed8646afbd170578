pub mod chat;
pub mod config_cmd;
pub mod history;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use chatloom_agent::{
    AgentSettings, ChainingHeuristic, ContextAssembler, LlmSummarizer, MemorySettings, Orchestrator, SessionManager,
};
use chatloom_config::AppConfig;
use chatloom_core::memory::MemoryBackend;
use chatloom_core::profile::ProfileStore;
use chatloom_core::session::TurnStore;
use chatloom_memory::{InMemoryBackend, InMemoryProfileStore, InMemoryTurnStore, SqliteStore};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// The persistence backends named by `memory.turn_store`.
pub struct Stores {
    pub turns: Arc<dyn TurnStore>,
    pub index: Arc<dyn MemoryBackend>,
    pub profile: Arc<dyn ProfileStore>,
}

/// Open the stores named by `memory.turn_store`.
///
/// With SQLite all three live in the same database file.
pub async fn open_stores(config: &AppConfig) -> CliResult<Stores> {
    match config.memory.turn_store.as_str() {
        "in_memory" => Ok(Stores {
            turns: Arc::new(InMemoryTurnStore::new()),
            index: Arc::new(InMemoryBackend::new()),
            profile: Arc::new(InMemoryProfileStore::new()),
        }),
        _ => {
            let path = config.memory.db_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = Arc::new(SqliteStore::new(&path.to_string_lossy()).await?);
            Ok(Stores {
                turns: store.clone(),
                index: store.clone(),
                profile: store,
            })
        }
    }
}

/// Wire provider, stores, tools and orchestrator into a session manager.
pub async fn build_sessions(config: &AppConfig) -> CliResult<SessionManager> {
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY   = 'sk-...'");
        eprintln!("    CHATLOOM_API_KEY = 'sk-...'   (any OpenAI-compatible endpoint)");
        eprintln!();
        eprintln!("  Or add `api_key` to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = chatloom_providers::build_provider(config)?;
    let stores = open_stores(config).await?;
    let profile = stores.profile.load_profile().await?.unwrap_or_default().shared();
    let tools = Arc::new(chatloom_tools::default_registry(
        config,
        stores.index.clone(),
        profile.clone(),
        Some(stores.profile),
    ));

    let mut assembler = ContextAssembler::new();
    if let Some(prompt) = &config.agent.system_prompt {
        assembler = assembler.with_preamble(prompt.clone());
    }
    let chaining = if config.agent.force_continuation {
        ChainingHeuristic::default()
    } else {
        ChainingHeuristic::disabled()
    };

    let orchestrator = Orchestrator::new(provider.clone(), tools, profile, AgentSettings::from(config))
        .with_index(stores.index)
        .with_assembler(assembler)
        .with_chaining(chaining);
    let summarizer = LlmSummarizer::new(provider, config.llm.summary_model.clone())
        .with_timeout(Duration::from_secs(config.agent.llm_timeout_secs));

    Ok(SessionManager::new(Arc::new(orchestrator), MemorySettings::from(config), Arc::new(summarizer))
        .with_turn_store(stores.turns))
}
