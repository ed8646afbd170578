//! The conversation orchestrator at the heart of Chatloom.
//!
//! Each user message runs as one **turn**, a small state machine:
//!
//! 1. **Thinking**: assemble the context block (profile, summary, recent
//!    history, last tool result) and ask the chat model
//! 2. **ToolCall**: run the single tool the model requested, then think again
//! 3. **Finished**: the model answered with text (or the turn failed)
//!
//! The number of tool executions per turn is bounded; when the budget runs
//! out a fallback completion without tools produces the answer. Finished
//! turns are appended to the session's [`MemoryStore`], which folds old pairs
//! into a rolling summary, and indexed for later search.

pub mod chaining;
pub mod context;
pub mod orchestrator;
pub mod session;
pub mod settings;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use chaining::{ChainAction, ChainRule, ChainingHeuristic};
pub use context::{ContextAssembler, ContextSections, Directive, ToolCallReport, ToolResultSection};
pub use orchestrator::Orchestrator;
pub use session::{AppendReport, ExtractiveSummarizer, LlmSummarizer, MemoryStore, SessionManager, Summarizer};
pub use settings::{AgentSettings, MemorySettings};
pub use state::{ChatState, ConversationTurnState, FinalResult};
