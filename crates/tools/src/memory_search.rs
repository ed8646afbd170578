//! `search_chat_history`: lets the model look up earlier turns.
//!
//! Delegates to whatever [`MemoryBackend`] indexes finished turns and renders
//! the best matches as a numbered list, capped at a character budget so a
//! large hit cannot crowd out the rest of the context block.

use async_trait::async_trait;
use chatloom_core::error::ToolError;
use chatloom_core::memory::{MemoryBackend, MemoryQuery};
use chatloom_core::tool::{Tool, ToolResult};
use std::sync::Arc;

pub struct MemorySearchTool {
    backend: Arc<dyn MemoryBackend>,
    limit: usize,
    max_chars: usize,
}

impl MemorySearchTool {
    pub fn new(backend: Arc<dyn MemoryBackend>, limit: usize, max_chars: usize) -> Self {
        Self {
            backend,
            limit: limit.max(1),
            max_chars,
        }
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str(" …[truncated]");
    out
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "search_chat_history"
    }

    fn description(&self) -> &str {
        "Search earlier conversations between you and the user. Use a short, specific query \
         when you need a detail the user mentioned before that is not in the current context."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for, e.g. 'sister's name' or 'favourite food'"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'query' must be a non-empty string".into()))?;

        let entries = match self
            .backend
            .search(MemoryQuery::new(query).with_limit(self.limit))
            .await
        {
            Ok(entries) => entries,
            Err(e) => return Ok(ToolResult::failure(format!("chat history search failed: {e}"))),
        };

        if entries.is_empty() {
            return Ok(ToolResult::success(format!(
                "No earlier conversation matches '{query}'."
            )));
        }

        let listing = entries
            .iter()
            .enumerate()
            .map(|(i, e)| format!("{}. {}", i + 1, e.content))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolResult::success(truncate_chars(&listing, self.max_chars))
            .with_data(serde_json::json!({ "matches": entries.len() })))
    }
}
