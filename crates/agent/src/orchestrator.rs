//! The per-turn state machine.
//!
//! A turn alternates between asking the model (Thinking) and running the one
//! tool it requested (ToolCall) until the model answers with text:
//!
//! 1. **Thinking**: assemble the context block, call the chat model with the
//!    tool definitions. A text answer finishes the turn; a tool request is
//!    validated and moves to ToolCall; an invalid request is reported back
//!    to the model as a failure, unless the budget is spent, in which case
//!    the fallback completion ends the turn.
//! 2. **ToolCall**: charge the request against `max_tool_calls`, dispatch it
//!    and go back to Thinking with the result. If the budget is already
//!    spent, the fallback model is asked for a final answer with tools
//!    disabled instead.
//!
//! Only a failed LLM call ends a turn with an error, and only a successful
//! turn touches memory.

use std::sync::Arc;

use chatloom_core::error::TurnError;
use chatloom_core::memory::{MemoryBackend, MemoryEntry};
use chatloom_core::message::{Message, MessageToolCall};
use chatloom_core::profile::SharedProfile;
use chatloom_core::provider::{Provider, ProviderRequest, ToolDefinition};
use chatloom_core::session::TurnPair;
use chatloom_core::tool::{ToolRegistry, ToolResult};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::chaining::ChainingHeuristic;
use crate::context::{ContextAssembler, ContextSections, Directive, ToolCallReport, ToolResultSection, token};
use crate::session::MemoryStore;
use crate::settings::AgentSettings;
use crate::state::{ChatState, ConversationTurnState, FinalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Primary,
    Fallback,
}

/// Drives conversation turns for any number of sessions.
///
/// Holds no per-session state: each turn borrows the session's
/// [`MemoryStore`] mutably for its duration.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    profile: SharedProfile,
    settings: AgentSettings,
    assembler: ContextAssembler,
    chaining: ChainingHeuristic,
    /// Search index every finished turn is written to
    index: Option<Arc<dyn MemoryBackend>>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        profile: SharedProfile,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            tools,
            profile,
            settings,
            assembler: ContextAssembler::new(),
            chaining: ChainingHeuristic::default(),
            index: None,
        }
    }

    /// Index every finished turn in `index`.
    pub fn with_index(mut self, index: Arc<dyn MemoryBackend>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_chaining(mut self, chaining: ChainingHeuristic) -> Self {
        self.chaining = chaining;
        self
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn and return the answer or the error that ended it.
    pub async fn run_turn(&self, user_message: &str, memory: &mut MemoryStore) -> FinalResult {
        self.drive_turn(user_message, memory).await.final_result()
    }

    /// Run one turn and return its final state.
    pub async fn drive_turn(&self, user_message: &str, memory: &mut MemoryStore) -> ConversationTurnState {
        let mut state = ConversationTurnState::new(self.settings.max_tool_calls);
        let mut section = ToolResultSection::empty();
        // One forced re-entry per completed tool
        let mut may_insist = false;
        let tools = self.tools.definitions();

        info!(
            session_id = %memory.session_id(),
            max_tool_calls = self.settings.max_tool_calls,
            "Turn started"
        );

        loop {
            debug!(chat_state = %state.chat_state, tool_call_count = state.tool_call_count, "Turn step");
            match state.chat_state {
                ChatState::Thinking => {
                    let context = self.build_context(memory, &section).await;
                    let reply = match self.invoke(&context, user_message, &tools, Completion::Primary).await {
                        Ok(reply) => reply,
                        Err(e) => {
                            warn!(session_id = %memory.session_id(), error = %e, "Chat completion failed");
                            state.finish_with_error(&e);
                            continue;
                        }
                    };

                    if let Some(call) = reply.tool_calls.first() {
                        if reply.tool_calls.len() > 1 {
                            debug!(requested = reply.tool_calls.len(), "Only the first tool request is processed");
                        }
                        match self.check_request(call) {
                            Ok(args) => {
                                debug!(tool = %call.name, "Tool requested");
                                state.request_tool(&call.name, args);
                            }
                            Err((args, err)) => {
                                warn!(error = %err, rejected_requests = state.rejected_requests + 1, "Tool request rejected");
                                let result = ToolResult::failure(rejection_reason(&err));
                                state.reject_request(result.clone());
                                may_insist = false;

                                section = ToolResultSection::after(
                                    ToolCallReport::new(&call.name, args, result),
                                    Directive::Proceed,
                                );

                                // With no budget left the fallback is the only way out.
                                if state.budget_exhausted() || state.rejections_exhausted() {
                                    info!(
                                        tool_call_count = state.tool_call_count,
                                        rejected_requests = state.rejected_requests,
                                        "No tool budget left, using fallback completion"
                                    );
                                    section = section.with_directive(Directive::Conclude);
                                    self.conclude(&mut state, memory, &section, user_message).await;
                                }
                            }
                        }
                    } else if reply.has_text() {
                        if may_insist && !state.budget_exhausted() {
                            may_insist = false;
                            info!(tool_call_count = state.tool_call_count, "Request incomplete, asking the model to continue");
                            section = section.with_directive(Directive::Insist);
                            continue;
                        }
                        state.finish_with_response(reply.content.trim());
                    } else {
                        state.finish_with_error(&TurnError::LlmInvocation("no valid assistant response".into()));
                    }
                }

                ChatState::ToolCall => {
                    let (name, args) = match state.begin_tool_call() {
                        Ok(request) => request,
                        Err(e) => {
                            info!(reason = %e, "Tool budget exhausted, using fallback completion");
                            section = section.with_directive(Directive::Conclude);
                            self.conclude(&mut state, memory, &section, user_message).await;
                            continue;
                        }
                    };

                    info!(tool = %name, tool_call_count = state.tool_call_count, "Dispatching tool");
                    let result = self.tools.dispatch(&name, args.clone()).await;
                    if !result.is_success() {
                        let err = TurnError::ToolExecution {
                            tool: name.clone(),
                            reason: result.detail.clone(),
                        };
                        warn!(error = %err, "Tool call failed");
                    }

                    let directive = if state.budget_exhausted() {
                        Directive::Conclude
                    } else if result.is_success() && self.chaining.should_force_continue(&name, user_message) {
                        Directive::Continue
                    } else {
                        Directive::Proceed
                    };
                    may_insist = directive == Directive::Continue;
                    section = ToolResultSection::after(ToolCallReport::new(&name, args, result.clone()), directive);
                    state.complete_tool_call(result);
                }

                ChatState::Finished => break,
            }
        }

        if let Some(text) = state.assistant_response.clone() {
            self.record_turn(user_message, &text, memory).await;
        }

        info!(
            session_id = %memory.session_id(),
            tool_call_count = state.tool_call_count,
            rejected_requests = state.rejected_requests,
            used_fallback = state.used_fallback,
            success = state.error_message.is_none(),
            "Turn finished"
        );
        state
    }

    async fn build_context(&self, memory: &MemoryStore, section: &ToolResultSection) -> String {
        // Re-read every time: a profile tool may have changed it mid-turn.
        let profile = self.profile.read().await.clone();
        self.assembler.assemble(ContextSections {
            profile: &profile,
            summary: memory.get_summary(),
            history: memory.get_history(),
            tool_result: section,
        })
    }

    async fn invoke(
        &self,
        context: &str,
        user_message: &str,
        tools: &[ToolDefinition],
        completion: Completion,
    ) -> Result<Message, TurnError> {
        let (model, temperature) = match completion {
            Completion::Primary => (&self.settings.chat_model, self.settings.temperature),
            Completion::Fallback => (&self.settings.fallback_model, self.settings.fallback_temperature),
        };
        debug!(
            model = %model,
            context_tokens = token::estimate_tokens(context),
            tools = tools.len(),
            "Invoking model"
        );
        let request = ProviderRequest::new(model, vec![Message::system(context), Message::user(user_message)])
            .with_temperature(temperature)
            .with_max_tokens(self.settings.max_tokens)
            .with_tools(tools.to_vec());

        let response = tokio::time::timeout(self.settings.llm_timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                TurnError::LlmInvocation(format!("timed out after {}s", self.settings.llm_timeout.as_secs()))
            })??;

        if let Some(usage) = &response.usage {
            debug!(
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion usage"
            );
        }
        Ok(response.message)
    }

    /// Parse and validate a requested call. On rejection, returns the
    /// arguments as far as they could be read, for reporting.
    fn check_request(&self, call: &MessageToolCall) -> Result<Value, (Value, TurnError)> {
        let raw = call.arguments.trim();
        let args = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw).map_err(|e| {
                (
                    Value::String(raw.to_string()),
                    TurnError::ToolDispatch {
                        tool: call.name.clone(),
                        reason: format!("arguments are not valid JSON: {e}"),
                    },
                )
            })?
        };

        match self.tools.validate(&call.name, &args) {
            Ok(()) => Ok(args),
            Err(e) => Err((
                args,
                TurnError::ToolDispatch {
                    tool: call.name.clone(),
                    reason: e.to_string(),
                },
            )),
        }
    }

    /// Ask the fallback model for a final answer with tools disabled.
    async fn conclude(
        &self,
        state: &mut ConversationTurnState,
        memory: &MemoryStore,
        section: &ToolResultSection,
        user_message: &str,
    ) {
        state.used_fallback = true;
        let context = self.build_context(memory, section).await;
        match self.invoke(&context, user_message, &[], Completion::Fallback).await {
            Ok(reply) if reply.has_text() => state.finish_with_response(reply.content.trim()),
            Ok(_) => state.finish_with_error(&TurnError::LlmInvocation(
                "no valid assistant response from fallback completion".into(),
            )),
            Err(e) => {
                warn!(session_id = %memory.session_id(), error = %e, "Fallback completion failed");
                state.finish_with_error(&e);
            }
        }
    }

    /// Append to memory, then index the pair in the background.
    async fn record_turn(&self, user_message: &str, assistant: &str, memory: &mut MemoryStore) {
        memory.append(user_message, assistant).await;

        let Some(index) = self.index.clone() else {
            return;
        };
        let session = memory.session_id().clone();
        let entry = MemoryEntry::new(TurnPair::new(user_message, assistant).index_text()).with_source(session.to_string());
        tokio::spawn(async move {
            if let Err(e) = index.store(entry).await {
                warn!(session_id = %session, backend = index.name(), error = %e, "Failed to index turn");
            }
        });
    }
}

fn rejection_reason(err: &TurnError) -> String {
    match err {
        TurnError::ToolDispatch { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ExtractiveSummarizer;
    use crate::settings::MemorySettings;
    use crate::testing::{ScriptedProvider, make_text_response, tool_request};
    use async_trait::async_trait;
    use chatloom_core::error::{ProviderError, ToolError};
    use chatloom_core::message::SessionId;
    use chatloom_core::profile::UserProfile;
    use chatloom_core::tool::Tool;
    use chatloom_memory::InMemoryBackend;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubTool {
        name: &'static str,
        result: ToolResult,
        calls: Arc<AtomicUsize>,
    }

    impl StubTool {
        fn boxed(name: &'static str, result: ToolResult) -> (Box<dyn Tool>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let tool = Self {
                name,
                result,
                calls: calls.clone(),
            };
            (Box::new(tool), calls)
        }
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "identifier": { "type": "string" },
                    "page_id": { "type": "string" },
                    "content": { "type": "string" }
                },
                "additionalProperties": false
            })
        }
        async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    struct Harness {
        provider: Arc<ScriptedProvider>,
        orchestrator: Orchestrator,
        memory: MemoryStore,
    }

    fn harness(script: Vec<chatloom_core::provider::ProviderResponse>, tools: Vec<Box<dyn Tool>>, max_tool_calls: u32) -> Harness {
        let provider = Arc::new(ScriptedProvider::replies(script));
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        let settings = AgentSettings {
            max_tool_calls,
            fallback_model: "fallback-model".into(),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(
            provider.clone(),
            Arc::new(registry),
            UserProfile::default().shared(),
            settings,
        );
        let memory = MemoryStore::new(SessionId::from("test"), MemorySettings::default(), Arc::new(ExtractiveSummarizer));
        Harness {
            provider,
            orchestrator,
            memory,
        }
    }

    #[tokio::test]
    async fn plain_answer_uses_no_tools() {
        let mut h = harness(vec![make_text_response("Hi there!")], vec![], 3);

        let state = h.orchestrator.drive_turn("Hello", &mut h.memory).await;
        assert_eq!(state.final_result(), FinalResult::Text("Hi there!".into()));
        assert_eq!(state.tool_call_count, 0);
        assert_eq!(h.memory.get_history().len(), 1);
        assert_eq!(h.memory.get_history()[0].user, "Hello");

        let request = &h.provider.requests()[0];
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].content, "Hello");
        assert!(request.messages[0].content.contains("## Recent conversation"));
        assert!(!request.messages[0].content.contains("Tool Call"));
    }

    #[tokio::test]
    async fn lookup_then_modify_chains_two_tools() {
        let (search, search_calls) = StubTool::boxed("workspace_search", ToolResult::success("Found page p1: Reading list"));
        let (add, add_calls) = StubTool::boxed("workspace_add_content", ToolResult::success("Content added"));
        let mut h = harness(
            vec![
                tool_request("workspace_search", json!({"query": "reading list"})),
                tool_request("workspace_add_content", json!({"page_id": "p1", "content": "Dune"})),
                make_text_response("Added Dune to your reading list."),
            ],
            vec![search, add],
            3,
        );

        let state = h
            .orchestrator
            .drive_turn("Find my reading list page and add Dune to it", &mut h.memory)
            .await;

        assert_eq!(state.tool_call_count, 2);
        assert_eq!(state.final_result(), FinalResult::Text("Added Dune to your reading list.".into()));
        assert_eq!(search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(add_calls.load(Ordering::SeqCst), 1);
        assert!(h.provider.context_of(1).contains("Continue with the next step"));
        assert!(h.provider.context_of(1).contains("Found page p1"));
        assert!(!h.provider.context_of(2).contains("Continue with the next step"));
    }

    #[tokio::test]
    async fn early_stop_after_forced_continue_is_retried_once() {
        let (search, _) = StubTool::boxed("workspace_search", ToolResult::success("Found page p1"));
        let (add, add_calls) = StubTool::boxed("workspace_add_content", ToolResult::success("Content added"));
        let mut h = harness(
            vec![
                tool_request("workspace_search", json!({"query": "todo"})),
                make_text_response("I found your page!"),
                tool_request("workspace_add_content", json!({"page_id": "p1", "content": "milk"})),
                make_text_response("Added milk."),
            ],
            vec![search, add],
            3,
        );

        let state = h.orchestrator.drive_turn("Find my todo page and add milk", &mut h.memory).await;
        assert_eq!(state.final_result(), FinalResult::Text("Added milk.".into()));
        assert_eq!(state.tool_call_count, 2);
        assert_eq!(add_calls.load(Ordering::SeqCst), 1);
        assert!(h.provider.context_of(2).contains("You answered without finishing"));
    }

    #[tokio::test]
    async fn second_early_stop_is_accepted() {
        let (search, _) = StubTool::boxed("workspace_search", ToolResult::success("Found page p1"));
        let mut h = harness(
            vec![
                tool_request("workspace_search", json!({"query": "todo"})),
                make_text_response("I found it."),
                make_text_response("Which item should I add?"),
            ],
            vec![search],
            3,
        );

        let result = h.orchestrator.run_turn("Find my todo page and add something", &mut h.memory).await;
        assert_eq!(result, FinalResult::Text("Which item should I add?".into()));
        assert_eq!(h.provider.call_count(), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_uses_fallback_once() {
        let (search, search_calls) = StubTool::boxed("workspace_search", ToolResult::success("one result"));
        let mut h = harness(
            vec![
                tool_request("workspace_search", json!({"query": "a"})),
                tool_request("workspace_search", json!({"query": "b"})),
                make_text_response("Here is what I found."),
            ],
            vec![search],
            1,
        );

        let state = h.orchestrator.drive_turn("Search for a and b", &mut h.memory).await;
        assert_eq!(state.final_result(), FinalResult::Text("Here is what I found.".into()));
        assert_eq!(state.tool_call_count, 1);
        assert!(state.used_fallback);
        assert_eq!(search_calls.load(Ordering::SeqCst), 1);

        let requests = h.provider.requests();
        assert_eq!(requests.len(), 3);
        assert!(!requests[1].tools.is_empty());
        assert!(requests[1].messages[0].content.contains("Tool Call Limit Reached"));
        assert!(requests[2].tools.is_empty());
        assert_eq!(requests[2].model, "fallback-model");
    }

    #[tokio::test]
    async fn rejected_request_after_budget_goes_straight_to_fallback() {
        let (search, search_calls) = StubTool::boxed("workspace_search", ToolResult::success("one result"));
        let mut h = harness(
            vec![
                tool_request("workspace_search", json!({"query": "a"})),
                tool_request("workspace_search", json!({"query": "b"})),
                tool_request("no_such_tool", json!({})),
                make_text_response("Here is a summary of both searches."),
            ],
            vec![search],
            2,
        );

        let state = h.orchestrator.drive_turn("Search for a and b", &mut h.memory).await;
        assert_eq!(state.final_result(), FinalResult::Text("Here is a summary of both searches.".into()));
        assert_eq!(state.tool_call_count, 2);
        assert_eq!(state.rejected_requests, 1);
        assert!(state.used_fallback);
        assert_eq!(search_calls.load(Ordering::SeqCst), 2);

        let requests = h.provider.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[3].model, "fallback-model");
        assert!(requests[3].tools.is_empty());
        let context = &requests[3].messages[0].content;
        assert!(context.contains("Tool Call Limit Reached"));
        assert!(context.contains("no_such_tool"));
    }

    #[tokio::test]
    async fn failed_tool_is_shown_to_the_model() {
        let (read, _) = StubTool::boxed("workspace_read_page", ToolResult::failure("not found"));
        let mut h = harness(
            vec![
                tool_request("workspace_read_page", json!({"identifier": "Recipes"})),
                make_text_response("I couldn't find a page called Recipes."),
            ],
            vec![read],
            3,
        );

        let state = h.orchestrator.drive_turn("Open my Recipes page", &mut h.memory).await;
        assert_eq!(state.tool_call_count, 1);
        assert_eq!(state.last_tool_outcome, Some(ToolResult::failure("not found")));
        assert_eq!(state.final_result(), FinalResult::Text("I couldn't find a page called Recipes.".into()));

        let context = h.provider.context_of(1);
        assert!(context.contains("## Tool Call Attempted"));
        assert!(context.contains("not found"));
        assert!(context.contains("  - identifier: Recipes"));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_without_spending_budget() {
        let mut h = harness(
            vec![
                tool_request("delete_everything", json!({})),
                make_text_response("I can't do that."),
            ],
            vec![],
            3,
        );

        let state = h.orchestrator.drive_turn("Delete everything", &mut h.memory).await;
        assert_eq!(state.tool_call_count, 0);
        assert_eq!(state.rejected_requests, 1);
        assert_eq!(state.final_result(), FinalResult::Text("I can't do that.".into()));
        assert!(h.provider.context_of(1).contains("Tool not found"));
    }

    #[tokio::test]
    async fn repeated_invalid_requests_end_in_fallback() {
        let (search, search_calls) = StubTool::boxed("workspace_search", ToolResult::success("x"));
        let mut h = harness(
            vec![
                tool_request("workspace_search", json!({"bogus": 1})),
                tool_request("workspace_search", json!({"bogus": 2})),
                make_text_response("Sorry, I could not search."),
            ],
            vec![search],
            2,
        );

        let state = h.orchestrator.drive_turn("search", &mut h.memory).await;
        assert_eq!(state.rejected_requests, 2);
        assert!(state.used_fallback);
        assert_eq!(search_calls.load(Ordering::SeqCst), 0);
        assert!(h.provider.requests()[2].tools.is_empty());
        assert!(h.provider.context_of(1).contains("unexpected argument `bogus`"));
    }

    #[tokio::test]
    async fn malformed_arguments_are_rejected() {
        let mut response = make_text_response("");
        response.message.tool_calls = vec![MessageToolCall {
            id: "c1".into(),
            name: "workspace_search".into(),
            arguments: "{not json".into(),
        }];
        let (search, _) = StubTool::boxed("workspace_search", ToolResult::success("x"));
        let mut h = harness(vec![response, make_text_response("ok")], vec![search], 3);

        let state = h.orchestrator.drive_turn("search", &mut h.memory).await;
        assert_eq!(state.rejected_requests, 1);
        assert!(h.provider.context_of(1).contains("arguments are not valid JSON"));
    }

    #[tokio::test]
    async fn llm_failure_ends_turn_without_persisting() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Network("connection reset".into()))]));
        let orchestrator = Orchestrator::new(
            provider,
            Arc::new(ToolRegistry::new()),
            UserProfile::default().shared(),
            AgentSettings::default(),
        );
        let mut memory = MemoryStore::new(SessionId::from("s"), MemorySettings::default(), Arc::new(ExtractiveSummarizer));

        let result = orchestrator.run_turn("Hello", &mut memory).await;
        assert!(result.is_error());
        assert!(result.into_display().starts_with("Error: LLM invocation failed"));
        assert!(memory.get_history().is_empty());
    }

    #[tokio::test]
    async fn empty_response_is_an_error() {
        let mut h = harness(vec![make_text_response("   ")], vec![], 3);
        let state = h.orchestrator.drive_turn("Hello", &mut h.memory).await;
        assert_eq!(
            state.final_result(),
            FinalResult::Error("LLM invocation failed: no valid assistant response".into())
        );
        assert!(h.memory.get_history().is_empty());
    }

    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }
        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<chatloom_core::provider::ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::Network("unreachable".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn llm_timeout_is_an_error() {
        let orchestrator = Orchestrator::new(
            Arc::new(HangingProvider),
            Arc::new(ToolRegistry::new()),
            UserProfile::default().shared(),
            AgentSettings {
                llm_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        );
        let mut memory = MemoryStore::new(SessionId::from("s"), MemorySettings::default(), Arc::new(ExtractiveSummarizer));
        let result = orchestrator.run_turn("Hello", &mut memory).await;
        assert_eq!(result, FinalResult::Error("LLM invocation failed: timed out after 5s".into()));
    }

    #[tokio::test]
    async fn finished_turn_is_indexed() {
        let index = Arc::new(InMemoryBackend::new());
        let mut h = harness(vec![make_text_response("Berlin is lovely.")], vec![], 3);
        h.orchestrator = h.orchestrator.with_index(index.clone());

        h.orchestrator.run_turn("I moved to Berlin", &mut h.memory).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index
            .search(chatloom_core::memory::MemoryQuery::new("Berlin"))
            .await
            .unwrap();
        assert_eq!(hits[0].content, "user: I moved to Berlin, assistant: Berlin is lovely.");
    }

    #[tokio::test]
    async fn profile_changes_show_up_in_next_context() {
        let mut h = harness(vec![make_text_response("a"), make_text_response("b")], vec![], 3);
        let profile = UserProfile::default().shared();
        h.orchestrator.profile = profile.clone();

        h.orchestrator.run_turn("first", &mut h.memory).await;
        profile.write().await.name = Some("Ada".into());
        h.orchestrator.run_turn("second", &mut h.memory).await;

        assert!(!h.provider.context_of(0).contains("- name: Ada"));
        assert!(h.provider.context_of(1).contains("- name: Ada"));
        assert!(h.provider.context_of(1).contains("user: first\nassistant: a"));
    }
}
