//! Workspace tools: search, read and write pages in the external document store.
//!
//! Every tool is a thin [`WorkspaceTool`] over one endpoint. Arguments are
//! validated against the schema by the registry, forwarded as the JSON body,
//! and the response envelope becomes the `(outcome, detail)` pair.

pub mod client;

use async_trait::async_trait;
use chatloom_core::error::ToolError;
use chatloom_core::tool::{Tool, ToolRegistry, ToolResult};
use serde_json::{Value, json};

use crate::memory_search::truncate_chars;
pub use client::{ApiEnvelope, WorkspaceClient};

/// Character cap on the data rendered into a tool detail.
const MAX_DETAIL_CHARS: usize = 4000;

/// The workspace endpoints exposed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceOp {
    Search,
    ReadPage,
    CreatePage,
    AddContent,
    ListPages,
    Analytics,
}

impl WorkspaceOp {
    pub const ALL: [WorkspaceOp; 6] = [
        WorkspaceOp::Search,
        WorkspaceOp::ReadPage,
        WorkspaceOp::CreatePage,
        WorkspaceOp::AddContent,
        WorkspaceOp::ListPages,
        WorkspaceOp::Analytics,
    ];

    pub fn tool_name(self) -> &'static str {
        match self {
            WorkspaceOp::Search => "workspace_search",
            WorkspaceOp::ReadPage => "workspace_read_page",
            WorkspaceOp::CreatePage => "workspace_create_page",
            WorkspaceOp::AddContent => "workspace_add_content",
            WorkspaceOp::ListPages => "workspace_list_pages",
            WorkspaceOp::Analytics => "workspace_analytics",
        }
    }

    fn path(self) -> &'static str {
        match self {
            WorkspaceOp::Search => "/api/search",
            WorkspaceOp::ReadPage => "/api/page/read",
            WorkspaceOp::CreatePage => "/api/page/create",
            WorkspaceOp::AddContent => "/api/page/add-content",
            WorkspaceOp::ListPages => "/api/bulk",
            WorkspaceOp::Analytics => "/api/analytics",
        }
    }

    fn description(self) -> &'static str {
        match self {
            WorkspaceOp::Search => {
                "Search pages and databases in the user's workspace. Use this first to find \
                 the page a request refers to."
            }
            WorkspaceOp::ReadPage => "Read the full content of a workspace page by ID or title.",
            WorkspaceOp::CreatePage => "Create a new workspace page with a title and optional content.",
            WorkspaceOp::AddContent => {
                "Append a block (paragraph, heading, bullet, to-do, bookmark or page link) to an \
                 existing page. Use the user's own words as content."
            }
            WorkspaceOp::ListPages => "List pages in the workspace, optionally filtered by a query.",
            WorkspaceOp::Analytics => "Get statistics about the workspace, its content or recent activity.",
        }
    }

    fn schema(self) -> Value {
        match self {
            WorkspaceOp::Search => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search text" },
                    "page_size": { "type": "integer", "description": "Max results (default 10)" }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
            WorkspaceOp::ReadPage => json!({
                "type": "object",
                "properties": {
                    "identifier": { "type": "string", "description": "Page ID or exact title" }
                },
                "required": ["identifier"],
                "additionalProperties": false
            }),
            WorkspaceOp::CreatePage => json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "content": { "type": "string" },
                    "parent_id": { "type": "string" }
                },
                "required": ["title"],
                "additionalProperties": false
            }),
            WorkspaceOp::AddContent => json!({
                "type": "object",
                "properties": {
                    "page_id": { "type": "string", "description": "Page ID or title" },
                    "content_type": {
                        "type": "string",
                        "enum": [
                            "paragraph", "heading_1", "heading_2", "heading_3",
                            "bulleted_list_item", "to_do", "bookmark", "link_to_page"
                        ]
                    },
                    "content": { "type": "string" },
                    "checked": { "type": "boolean", "description": "For to_do blocks" },
                    "url": { "type": "string", "description": "For bookmark blocks" }
                },
                "required": ["page_id", "content_type", "content"],
                "additionalProperties": false
            }),
            WorkspaceOp::ListPages => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Optional filter" }
                },
                "additionalProperties": false
            }),
            WorkspaceOp::Analytics => json!({
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["workspace", "content", "activity", "database"]
                    }
                },
                "required": ["type"],
                "additionalProperties": false
            }),
        }
    }

    /// Request body for this endpoint, filling the service's defaults.
    fn body(self, arguments: &Value) -> Value {
        let mut body = match arguments {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        match self {
            WorkspaceOp::Search => {
                body.entry("page_size").or_insert(json!(10));
            }
            WorkspaceOp::CreatePage => {
                body.entry("content").or_insert(json!(""));
            }
            WorkspaceOp::AddContent => {
                body.entry("checked").or_insert(json!(false));
            }
            WorkspaceOp::ListPages => {
                body.insert("operation".into(), json!("list"));
                body.entry("query").or_insert(json!(""));
            }
            WorkspaceOp::ReadPage | WorkspaceOp::Analytics => {}
        }
        Value::Object(body)
    }
}

/// Turn a response envelope into the tool's `(outcome, detail)`.
pub fn envelope_to_result(envelope: ApiEnvelope) -> ToolResult {
    if !envelope.success {
        let reason = if envelope.message.is_empty() {
            "workspace request failed".to_string()
        } else {
            envelope.message
        };
        return ToolResult::failure(reason);
    }

    let mut detail = if envelope.message.is_empty() {
        "OK".to_string()
    } else {
        envelope.message.clone()
    };
    if !envelope.data.is_null() {
        let rendered = serde_json::to_string_pretty(&envelope.data).unwrap_or_default();
        detail.push('\n');
        detail.push_str(&truncate_chars(&rendered, MAX_DETAIL_CHARS));
    }
    ToolResult::success(detail).with_data(envelope.data)
}

pub struct WorkspaceTool {
    op: WorkspaceOp,
    client: WorkspaceClient,
}

impl WorkspaceTool {
    pub fn new(op: WorkspaceOp, client: WorkspaceClient) -> Self {
        Self { op, client }
    }
}

#[async_trait]
impl Tool for WorkspaceTool {
    fn name(&self) -> &str {
        self.op.tool_name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn parameters_schema(&self) -> Value {
        self.op.schema()
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let envelope = self.client.post(self.op.path(), &self.op.body(&arguments)).await?;
        Ok(envelope_to_result(envelope))
    }
}

/// Register one tool per workspace endpoint.
pub fn register_workspace_tools(registry: &mut ToolRegistry, client: &WorkspaceClient) {
    for op in WorkspaceOp::ALL {
        registry.register(Box::new(WorkspaceTool::new(op, client.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chatloom_core::tool::ToolOutcome;
    use std::time::Duration;

    /// Spin up a fake workspace service on an ephemeral port.
    async fn fake_workspace() -> WorkspaceClient {
        let app = Router::new()
            .route("/health", get(|| async { Json(json!({ "status": "healthy" })) }))
            .route(
                "/api/search",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "success": true,
                        "data": { "results": [{ "id": "p1", "title": "Reading list" }], "query": body["query"], "page_size": body["page_size"] },
                        "message": "Found 1 results",
                        "timestamp": "2026-01-01T00:00:00"
                    }))
                }),
            )
            .route(
                "/api/page/read",
                post(|Json(_body): Json<Value>| async move {
                    Json(json!({ "success": false, "data": null, "message": "Page not found" }))
                }),
            )
            .route(
                "/api/page/add-content",
                post(|| async {
                    (
                        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "detail": "Add content failed: page is archived" })),
                    )
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        WorkspaceClient::new(format!("http://{addr}"), Duration::from_secs(5))
    }

    #[test]
    fn body_fills_defaults() {
        let body = WorkspaceOp::ListPages.body(&json!({}));
        assert_eq!(body["operation"], "list");
        assert_eq!(body["query"], "");

        let body = WorkspaceOp::Search.body(&json!({"query": "x", "page_size": 3}));
        assert_eq!(body["page_size"], 3);
    }

    #[test]
    fn tool_names_are_unique() {
        let mut names: Vec<&str> = WorkspaceOp::ALL.iter().map(|op| op.tool_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), WorkspaceOp::ALL.len());
    }

    #[test]
    fn failed_envelope_is_failure() {
        let env = ApiEnvelope {
            success: false,
            data: Value::Null,
            message: String::new(),
            timestamp: None,
        };
        let result = envelope_to_result(env);
        assert_eq!(result.outcome, ToolOutcome::Failure);
        assert_eq!(result.detail, "workspace request failed");
    }

    #[tokio::test]
    async fn health_reports_reachability() {
        let client = fake_workspace().await;
        assert!(client.health().await);
        assert!(client.base_url().starts_with("http://127.0.0.1:"));

        let down = WorkspaceClient::new("http://127.0.0.1:9/", Duration::from_secs(1));
        assert_eq!(down.base_url(), "http://127.0.0.1:9");
        assert!(!down.health().await);
    }

    #[tokio::test]
    async fn search_success() {
        let client = fake_workspace().await;
        let tool = WorkspaceTool::new(WorkspaceOp::Search, client);
        let result = tool.execute(json!({"query": "reading"})).await.unwrap();
        assert!(result.is_success());
        assert!(result.detail.starts_with("Found 1 results"));
        assert!(result.detail.contains("Reading list"));
        assert_eq!(result.data.unwrap()["page_size"], 10);
    }

    #[tokio::test]
    async fn unsuccessful_envelope_becomes_failure() {
        let client = fake_workspace().await;
        let tool = WorkspaceTool::new(WorkspaceOp::ReadPage, client);
        let result = tool.execute(json!({"identifier": "Missing"})).await.unwrap();
        assert_eq!(result.outcome, ToolOutcome::Failure);
        assert_eq!(result.detail, "Page not found");
    }

    #[tokio::test]
    async fn http_error_surfaces_detail() {
        let client = fake_workspace().await;
        let mut registry = ToolRegistry::new();
        register_workspace_tools(&mut registry, &client);
        assert_eq!(registry.len(), 6);

        let result = registry
            .dispatch(
                "workspace_add_content",
                json!({"page_id": "p1", "content_type": "paragraph", "content": "hello"}),
            )
            .await;
        assert_eq!(result.outcome, ToolOutcome::Failure);
        assert!(result.detail.contains("page is archived"));
        assert!(result.detail.contains("500"));
    }

    #[tokio::test]
    async fn unreachable_service_is_failure() {
        let client = WorkspaceClient::new("http://127.0.0.1:9", Duration::from_secs(1));
        let mut registry = ToolRegistry::new();
        register_workspace_tools(&mut registry, &client);
        let result = registry.dispatch("workspace_analytics", json!({"type": "workspace"})).await;
        assert_eq!(result.outcome, ToolOutcome::Failure);
        assert!(!client.health().await);
    }
}
