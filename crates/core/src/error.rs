//! Error types for the Chatloom domain.
//!
//! Each bounded context has its own `thiserror` enum. Tool-side errors never
//! reach the user directly: the registry turns them into a failed
//! [`ToolResult`](crate::tool::ToolResult) that the model gets to read.

use thiserror::Error;

/// The top-level error type for all Chatloom operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Turn errors ---
    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool unavailable: {0}")]
    Unavailable(String),
}

/// Failures that can happen while a single conversation turn is driven.
///
/// Only [`TurnError::LlmInvocation`] ends a turn with an error. The tool
/// variants are rendered into the next context block, and
/// [`TurnError::BudgetExhausted`] routes the turn to the fallback completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("Rejected tool request `{tool}`: {reason}")]
    ToolDispatch { tool: String, reason: String },

    #[error("Tool `{tool}` failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("LLM invocation failed: {0}")]
    LlmInvocation(String),

    #[error("Tool-call budget exhausted after {0} calls")]
    BudgetExhausted(u32),
}

impl From<ProviderError> for TurnError {
    fn from(err: ProviderError) -> Self {
        TurnError::LlmInvocation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn provider_error_becomes_llm_invocation() {
        let err: TurnError = ProviderError::Timeout("60s".into()).into();
        assert!(matches!(err, TurnError::LlmInvocation(_)));
        assert!(err.to_string().contains("60s"));
    }

    #[test]
    fn dispatch_error_names_the_tool() {
        let err = TurnError::ToolDispatch {
            tool: "workspace_search".into(),
            reason: "missing required argument `query`".into(),
        };
        let text = err.to_string();
        assert!(text.contains("workspace_search"));
        assert!(text.contains("query"));
    }
}
