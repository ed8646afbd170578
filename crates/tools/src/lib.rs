//! Built-in tool implementations for Chatloom.
//!
//! - `search_chat_history` searches earlier turns through the memory index
//! - `update_user_profile` edits the shared user profile
//! - `workspace_*` talk to the external document workspace over HTTP
//!
//! [`default_registry`] wires them up at process start.

pub mod memory_search;
pub mod profile_update;
pub mod workspace;

use std::sync::Arc;
use std::time::Duration;

use chatloom_config::AppConfig;
use chatloom_core::memory::MemoryBackend;
use chatloom_core::profile::{ProfileStore, SharedProfile};
use chatloom_core::tool::ToolRegistry;

pub use memory_search::MemorySearchTool;
pub use profile_update::ProfileUpdateTool;
pub use workspace::{WorkspaceClient, WorkspaceOp, WorkspaceTool, register_workspace_tools};

/// Create the tool registry described by `config`.
///
/// The workspace tools are only registered when `workspace.enabled` is set.
/// Profile updates are written through to `profile_store` when one is given.
pub fn default_registry(
    config: &AppConfig,
    index: Arc<dyn MemoryBackend>,
    profile: SharedProfile,
    profile_store: Option<Arc<dyn ProfileStore>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::with_limits(
        Duration::from_secs(config.agent.tool_timeout_secs),
        config.agent.max_concurrent_tools,
    );

    registry.register(Box::new(MemorySearchTool::new(
        index,
        config.memory.search_limit,
        config.memory.max_result_chars,
    )));
    let mut profile_tool = ProfileUpdateTool::new(profile);
    if let Some(store) = profile_store {
        profile_tool = profile_tool.with_store(store);
    }
    registry.register(Box::new(profile_tool));

    if config.workspace.enabled {
        let client = WorkspaceClient::new(
            config.workspace.api_url.clone(),
            Duration::from_secs(config.workspace.timeout_secs),
        );
        register_workspace_tools(&mut registry, &client);
    }

    tracing::debug!(tools = ?registry.names(), "Tool registry built");
    registry
}
