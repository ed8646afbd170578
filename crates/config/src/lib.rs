//! Configuration loading, validation, and management for Chatloom.
//!
//! Loads configuration from `~/.chatloom/config.toml` with environment
//! variable overrides. Validates all settings at startup. The resulting
//! [`AppConfig`] is built once and handed to whatever needs it; nothing in
//! the workspace reads configuration from a global.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.chatloom/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the chat-completions endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model identifiers and sampling settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Turn loop limits and timeouts
    #[serde(default)]
    pub agent: AgentConfig,

    /// Session memory and persistence
    #[serde(default)]
    pub memory: MemoryConfig,

    /// External document workspace
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("llm", &self.llm)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("workspace", &self.workspace)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model used for every tool-enabled completion
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for the tool-less fallback completion
    #[serde(default = "default_chat_model")]
    pub fallback_model: String,

    /// Model used to fold old turns into the rolling summary
    #[serde(default = "default_summary_model")]
    pub summary_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_temperature")]
    pub fallback_temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_chat_model() -> String {
    "gpt-4o".into()
}
fn default_summary_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            fallback_model: default_chat_model(),
            summary_model: default_summary_model(),
            temperature: default_temperature(),
            fallback_temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Tool executions allowed per turn
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Upper bound on tool executions running at once across all sessions
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,

    /// Nudge the model on to the next step after a lookup when the user
    /// asked for a change
    #[serde(default = "default_force_continuation")]
    pub force_continuation: bool,

    /// Replaces the built-in instructions at the top of every context block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_tool_calls() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent_tools() -> usize {
    8
}
fn default_force_continuation() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: default_max_tool_calls(),
            llm_timeout_secs: default_llm_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_concurrent_tools: default_max_concurrent_tools(),
            force_continuation: default_force_continuation(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Turn pairs kept verbatim in the context block
    #[serde(default = "default_max_history_pairs")]
    pub max_history_pairs: usize,

    /// Estimated tokens allowed for history + summary before compaction
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: usize,

    /// "sqlite" or "in_memory"
    #[serde(default = "default_turn_store")]
    pub turn_store: String,

    /// SQLite file; defaults to `~/.chatloom/chat.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Results returned by `search_chat_history`
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Character cap on rendered search results
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
}

fn default_max_history_pairs() -> usize {
    2
}
fn default_context_token_budget() -> usize {
    2000
}
fn default_turn_store() -> String {
    "sqlite".into()
}
fn default_search_limit() -> usize {
    3
}
fn default_max_result_chars() -> usize {
    1000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history_pairs: default_max_history_pairs(),
            context_token_budget: default_context_token_budget(),
            turn_store: default_turn_store(),
            db_path: None,
            search_limit: default_search_limit(),
            max_result_chars: default_max_result_chars(),
        }
    }
}

impl MemoryConfig {
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("chat.sqlite"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Register the workspace tools at startup
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_workspace_url")]
    pub api_url: String,

    #[serde(default = "default_workspace_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_workspace_url() -> String {
    "http://localhost:8000".into()
}
fn default_workspace_timeout_secs() -> u64 {
    10
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_workspace_url(),
            timeout_secs: default_workspace_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location with env var overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load configuration from `path`, then apply env var overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup (highest priority).
    ///
    /// A variable that is set but does not parse is an error rather than a
    /// silent fall back to the file value.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(key) = lookup("CHATLOOM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup("CHATLOOM_API_URL") {
            self.api_url = url;
        }
        if let Some(model) = lookup("CHATLOOM_CHAT_MODEL") {
            self.llm.chat_model = model;
        }
        if let Some(model) = lookup("CHATLOOM_FALLBACK_MODEL") {
            self.llm.fallback_model = model;
        }
        if let Some(model) = lookup("CHATLOOM_SUMMARY_MODEL") {
            self.llm.summary_model = model;
        }
        if let Some(t) = parse_env(&lookup, "CHATLOOM_TEMPERATURE")? {
            self.llm.temperature = t;
        }
        if let Some(n) = parse_env(&lookup, "CHATLOOM_MAX_TOOL_CALLS")? {
            self.agent.max_tool_calls = n;
        }
        if let Some(on) = parse_env(&lookup, "CHATLOOM_FORCE_CONTINUATION")? {
            self.agent.force_continuation = on;
        }
        if let Some(n) = parse_env(&lookup, "CHATLOOM_MAX_HISTORY_PAIRS")? {
            self.memory.max_history_pairs = n;
        }
        if let Some(n) = parse_env(&lookup, "CHATLOOM_CONTEXT_TOKEN_BUDGET")? {
            self.memory.context_token_budget = n;
        }
        if let Some(url) = lookup("CHATLOOM_WORKSPACE_URL") {
            self.workspace.api_url = url;
            self.workspace.enabled = true;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatloom")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, t) in [
            ("llm.temperature", self.llm.temperature),
            ("llm.fallback_temperature", self.llm.fallback_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.agent.max_tool_calls == 0 {
            return Err(ConfigError::ValidationError("agent.max_tool_calls must be >= 1".into()));
        }
        if self.agent.llm_timeout_secs == 0 || self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("agent timeouts must be > 0".into()));
        }
        if self.memory.max_history_pairs == 0 {
            return Err(ConfigError::ValidationError("memory.max_history_pairs must be >= 1".into()));
        }
        if self.memory.context_token_budget == 0 {
            return Err(ConfigError::ValidationError("memory.context_token_budget must be > 0".into()));
        }

        match self.memory.turn_store.as_str() {
            "sqlite" | "in_memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown memory.turn_store '{other}' (expected 'sqlite' or 'in_memory')"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            llm: LlmConfig::default(),
            agent: AgentConfig::default(),
            memory: MemoryConfig::default(),
            workspace: WorkspaceConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid value {value:?} in {var}: {reason}")]
    EnvError { var: String, value: String, reason: String },
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::EnvError {
        var: var.to_string(),
        value,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_tool_calls, 3);
        assert_eq!(config.memory.max_history_pairs, 2);
        assert_eq!(config.memory.context_token_budget, 2000);
        assert_eq!(config.llm.chat_model, "gpt-4o");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.chat_model, config.llm.chat_model);
        assert_eq!(parsed.agent.max_tool_calls, config.agent.max_tool_calls);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.llm.fallback_temperature = 5.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fallback_temperature"));
    }

    #[test]
    fn zero_budget_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_tool_calls = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_turn_store_rejected() {
        let mut config = AppConfig::default();
        config.memory.turn_store = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.memory.turn_store, "sqlite");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nmax_tool_calls = 5\n\n[workspace]\nenabled = true\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.max_tool_calls, 5);
        assert_eq!(config.agent.tool_timeout_secs, 30);
        assert!(config.workspace.enabled);
        assert_eq!(config.workspace.api_url, "http://localhost:8000");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\nmax_tool_calls = ").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("CHATLOOM_CHAT_MODEL", "gpt-4.1"),
            ("CHATLOOM_MAX_TOOL_CALLS", "1"),
            ("CHATLOOM_FORCE_CONTINUATION", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.chat_model, "gpt-4.1");
        assert_eq!(config.agent.max_tool_calls, 1);
        assert!(!config.agent.force_continuation);
        assert_eq!(config.memory.max_history_pairs, 2);
    }

    #[test]
    fn malformed_env_number_is_an_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "CHATLOOM_MAX_TOOL_CALLS").then(|| "abc".to_string()))
            .unwrap_err();

        assert!(matches!(&err, ConfigError::EnvError { var, .. } if var == "CHATLOOM_MAX_TOOL_CALLS"));
        assert!(err.to_string().contains("\"abc\""));
        assert_eq!(config.agent.max_tool_calls, 3);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-very-secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-very-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_tool_calls = 3"));
        assert!(toml_str.contains("gpt-4o"));
    }
}
