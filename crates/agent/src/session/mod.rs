//! Per-session memory, its summarizers, and the session manager.

pub mod manager;
pub mod store;
pub mod summarizer;

pub use manager::SessionManager;
pub use store::{AppendReport, MemoryStore};
pub use summarizer::{ExtractiveSummarizer, LlmSummarizer, Summarizer};
