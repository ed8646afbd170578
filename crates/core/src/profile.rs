//! The user profile shown to the model at the top of every context block.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::MemoryError;

/// Profile shared between the orchestrator (reader) and the
/// `update_user_profile` tool (writer).
pub type SharedProfile = Arc<RwLock<UserProfile>>;

/// Keys the model may update, in display order.
pub const PROFILE_KEYS: [&str; 7] = [
    "name",
    "last_name",
    "age",
    "gender",
    "location",
    "occupation",
    "interests",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
}

impl UserProfile {
    pub fn shared(self) -> SharedProfile {
        Arc::new(RwLock::new(self))
    }

    pub fn is_empty(&self) -> bool {
        *self == UserProfile::default()
    }

    /// Apply a partial update. Either every field is applied or none is.
    ///
    /// Returns the names of the fields that were set.
    pub fn apply(&mut self, updates: &Map<String, Value>) -> std::result::Result<Vec<String>, String> {
        let mut next = self.clone();
        let mut changed = Vec::new();

        for (key, value) in updates {
            match key.as_str() {
                "name" => next.name = Some(as_text(key, value)?),
                "last_name" => next.last_name = Some(as_text(key, value)?),
                "gender" => next.gender = Some(as_text(key, value)?),
                "location" => next.location = Some(as_text(key, value)?),
                "occupation" => next.occupation = Some(as_text(key, value)?),
                "age" => {
                    let age = value
                        .as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| format!("`age` must be a non-negative integer, got {value}"))?;
                    next.age = Some(age);
                }
                "interests" => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| "`interests` must be a list of strings".to_string())?;
                    next.interests = items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| "`interests` must be a list of strings".to_string())?;
                }
                other => {
                    return Err(format!(
                        "unknown profile key `{other}` (allowed: {})",
                        PROFILE_KEYS.join(", ")
                    ));
                }
            }
            changed.push(key.clone());
        }

        *self = next;
        Ok(changed)
    }

    /// One `- key: value` line per known field, in a fixed order.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                lines.push(format!("- {key}: {v}"));
            }
        };
        push("name", self.name.clone());
        push("last_name", self.last_name.clone());
        push("age", self.age.map(|a| a.to_string()));
        push("gender", self.gender.clone());
        push("location", self.location.clone());
        push("occupation", self.occupation.clone());
        if !self.interests.is_empty() {
            push("interests", Some(self.interests.join(", ")));
        }
        lines.join("\n")
    }
}

/// Durable home of the user profile, so it outlives the process.
///
/// Implementations: in-memory, SQLite.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    fn name(&self) -> &str;

    /// The saved profile, if one was ever written.
    async fn load_profile(&self) -> std::result::Result<Option<UserProfile>, MemoryError>;

    /// Replace the saved profile.
    async fn save_profile(&self, profile: &UserProfile) -> std::result::Result<(), MemoryError>;
}

fn as_text(key: &str, value: &Value) -> std::result::Result<String, String> {
    value
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("`{key}` must be a non-empty string"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn apply_sets_fields() {
        let mut profile = UserProfile::default();
        let changed = profile
            .apply(&obj(json!({"name": "Ada", "age": 36, "interests": ["math", "engines"]})))
            .unwrap();
        assert_eq!(changed.len(), 3);
        assert_eq!(profile.name.as_deref(), Some("Ada"));
        assert_eq!(profile.age, Some(36));
        assert_eq!(profile.interests, vec!["math", "engines"]);
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let mut profile = UserProfile::default();
        let err = profile.apply(&obj(json!({"name": "Ada", "age": "old"}))).unwrap_err();
        assert!(err.contains("age"));
        assert!(profile.is_empty());
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut profile = UserProfile::default();
        let err = profile.apply(&obj(json!({"shoe_size": 9}))).unwrap_err();
        assert!(err.contains("shoe_size"));
    }

    #[test]
    fn render_is_ordered() {
        let profile = UserProfile {
            name: Some("Ada".into()),
            location: Some("London".into()),
            age: Some(36),
            ..Default::default()
        };
        assert_eq!(profile.render(), "- name: Ada\n- age: 36\n- location: London");
    }
}
