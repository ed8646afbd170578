//! # Chatloom Core
//!
//! Domain types, traits, and error definitions for the Chatloom conversation
//! orchestrator. Everything the orchestrator talks to (LLM providers, tools,
//! the search index, turn persistence) is described here as a trait, and the
//! concrete implementations live in their own crates.
//!
//! All crates depend inward on this one.

pub mod error;
pub mod memory;
pub mod message;
pub mod profile;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result, TurnError};
pub use memory::{MemoryBackend, MemoryEntry, MemoryQuery};
pub use message::{Message, MessageToolCall, Role, SessionId};
pub use profile::{ProfileStore, SharedProfile, UserProfile};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use session::{SessionSummary, TurnPair, TurnStore};
pub use tool::{Tool, ToolOutcome, ToolRegistry, ToolResult};
