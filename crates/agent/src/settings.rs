//! Narrow settings structs injected into the orchestrator and memory store.

use std::time::Duration;

use chatloom_config::AppConfig;

/// Everything the orchestrator needs to drive a turn.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub chat_model: String,
    pub fallback_model: String,
    pub temperature: f32,
    pub fallback_temperature: f32,
    pub max_tokens: Option<u32>,
    /// Tool executions allowed per turn
    pub max_tool_calls: u32,
    pub llm_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o".into(),
            fallback_model: "gpt-4o".into(),
            temperature: 0.0,
            fallback_temperature: 0.0,
            max_tokens: None,
            max_tool_calls: 3,
            llm_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&AppConfig> for AgentSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            chat_model: config.llm.chat_model.clone(),
            fallback_model: config.llm.fallback_model.clone(),
            temperature: config.llm.temperature,
            fallback_temperature: config.llm.fallback_temperature,
            max_tokens: config.llm.max_tokens,
            max_tool_calls: config.agent.max_tool_calls,
            llm_timeout: Duration::from_secs(config.agent.llm_timeout_secs),
        }
    }
}

/// Limits for a session's rolling memory.
#[derive(Debug, Clone)]
pub struct MemorySettings {
    pub max_history_pairs: usize,
    /// Estimated tokens allowed for history + summary
    pub context_token_budget: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_history_pairs: 2,
            context_token_budget: 2000,
        }
    }
}

impl From<&AppConfig> for MemorySettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_history_pairs: config.memory.max_history_pairs,
            context_token_budget: config.memory.context_token_budget,
        }
    }
}
