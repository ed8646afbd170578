//! Search-index, turn-store and profile-store implementations for Chatloom.

pub mod in_memory;
pub mod noop;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::{InMemoryBackend, InMemoryProfileStore, InMemoryTurnStore};
pub use noop::NoopMemory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
