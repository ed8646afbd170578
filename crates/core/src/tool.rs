//! Tool trait and registry.
//!
//! A tool is known to the orchestrator only by its name, its JSON argument
//! schema and the `(outcome, detail)` pair it returns. The [`ToolRegistry`]
//! is the single dispatch point and it fails closed: unknown names, schema
//! mismatches, tool errors, panics and timeouts all come back as
//! [`ToolOutcome::Failure`] with a readable detail, never as an `Err`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Whether a tool call achieved what it was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    Success,
    Failure,
}

impl std::fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolOutcome::Success => write!(f, "success"),
            ToolOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub outcome: ToolOutcome,

    /// Human/model readable description of what happened
    pub detail: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            outcome: ToolOutcome::Success,
            detail: detail.into(),
            data: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            outcome: ToolOutcome::Failure,
            detail: detail.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ToolOutcome::Success
    }
}

/// The core Tool trait.
///
/// Implementations may return `Err(ToolError)` for convenience; the registry
/// converts it into a failed [`ToolResult`] before anything else sees it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search_chat_history").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with arguments that already passed schema validation.
    async fn execute(&self, arguments: Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_CONCURRENT: usize = 8;

/// A registry of available tools.
///
/// Built once at startup and shared (behind an `Arc`) by every session.
/// Each dispatch runs on its own task, bounded by a registry-wide semaphore
/// and guarded by a timeout. A caller that stops waiting does not cancel
/// the task.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TOOL_TIMEOUT, DEFAULT_MAX_CONCURRENT)
    }

    pub fn with_limits(timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::from(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool definitions, sorted by name so requests are reproducible.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check that `name` is registered and `arguments` satisfy its schema.
    pub fn validate(&self, name: &str, arguments: &Value) -> std::result::Result<(), ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        check_arguments(&tool.parameters_schema(), arguments).map_err(ToolError::InvalidArguments)
    }

    /// Dispatch a tool call. Never returns an error.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> ToolResult {
        if let Err(e) = self.validate(name, &arguments) {
            debug!(tool = name, error = %e, "Tool request rejected");
            return ToolResult::failure(e.to_string());
        }
        let Some(tool) = self.tools.get(name).cloned() else {
            return ToolResult::failure(ToolError::NotFound(name.to_string()).to_string());
        };

        let permits = self.permits.clone();
        let limit = self.timeout;
        let tool_name = name.to_string();
        let handle = tokio::spawn(async move {
            let _permit = permits.acquire_owned().await;
            tokio::time::timeout(limit, tool.execute(arguments)).await
        });

        match handle.await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                warn!(tool = %tool_name, error = %e, "Tool returned an error");
                ToolResult::failure(e.to_string())
            }
            Ok(Err(_)) => {
                warn!(tool = %tool_name, timeout_secs = limit.as_secs(), "Tool timed out");
                ToolResult::failure("timeout")
            }
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "Tool task aborted");
                ToolResult::failure(format!("tool task aborted: {e}"))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate `args` against the subset of JSON Schema that tool parameter
/// schemas use: `type`, `properties`, `required`, `enum`, `items` and
/// `additionalProperties: false`.
pub fn check_arguments(schema: &Value, args: &Value) -> std::result::Result<(), String> {
    check_value(schema, args, "arguments")
}

fn check_value(schema: &Value, value: &Value, path: &str) -> std::result::Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(format!("`{path}` must be of type {expected}, got {}", type_name(value)));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("`{path}` must be one of {}", Value::Array(allowed.clone())));
        }
    }

    if let Value::Object(map) = value {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                match map.get(key) {
                    None | Some(Value::Null) => {
                        return Err(format!("missing required argument `{key}`"));
                    }
                    Some(_) => {}
                }
            }
        }

        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
        for (key, field) in map {
            match properties.and_then(|p| p.get(key)) {
                Some(sub) => {
                    if field.is_null() {
                        continue;
                    }
                    check_value(sub, field, key)?;
                }
                None if closed => return Err(format!("unexpected argument `{key}`")),
                None => {}
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check_value(item_schema, item, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
