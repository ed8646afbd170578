//! `update_user_profile`: records personal details the user shares.
//!
//! The shared in-process profile is updated first; when a [`ProfileStore`]
//! is attached the new profile is written through to it so it survives a
//! restart.

use std::sync::Arc;

use async_trait::async_trait;
use chatloom_core::error::ToolError;
use chatloom_core::profile::{ProfileStore, SharedProfile};
use chatloom_core::tool::{Tool, ToolResult};
use tracing::{info, warn};

pub struct ProfileUpdateTool {
    profile: SharedProfile,
    store: Option<Arc<dyn ProfileStore>>,
}

impl ProfileUpdateTool {
    pub fn new(profile: SharedProfile) -> Self {
        Self { profile, store: None }
    }

    pub fn with_store(mut self, store: Arc<dyn ProfileStore>) -> Self {
        self.store = Some(store);
        self
    }
}

#[async_trait]
impl Tool for ProfileUpdateTool {
    fn name(&self) -> &str {
        "update_user_profile"
    }

    fn description(&self) -> &str {
        "Update the user's stored profile when they share personal details that differ from \
         what you already know. Only pass the fields that changed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "last_name": { "type": "string" },
                "age": { "type": "integer", "minimum": 0 },
                "gender": { "type": "string" },
                "location": { "type": "string" },
                "occupation": { "type": "string" },
                "interests": { "type": "array", "items": { "type": "string" } }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let updates = arguments
            .as_object()
            .ok_or_else(|| ToolError::InvalidArguments("expected an object of profile fields".into()))?;

        if updates.is_empty() {
            return Ok(ToolResult::failure("no profile fields were provided"));
        }

        let mut profile = self.profile.write().await;
        let changed = match profile.apply(updates) {
            Ok(changed) => changed,
            Err(reason) => return Ok(ToolResult::failure(reason)),
        };
        info!(fields = ?changed, "User profile updated");

        // Saved under the write lock so concurrent updates reach the store in order.
        if let Some(store) = &self.store
            && let Err(e) = store.save_profile(&profile).await
        {
            warn!(store = store.name(), error = %e, "Failed to persist user profile");
        }

        Ok(ToolResult::success(format!("Profile updated: {}", changed.join(", "))))
    }
}
