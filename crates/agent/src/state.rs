//! Per-turn state machine data.

use chatloom_core::error::TurnError;
use chatloom_core::tool::ToolResult;
use serde_json::Value;

/// Where the orchestrator is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Thinking,
    ToolCall,
    Finished,
}

impl std::fmt::Display for ChatState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatState::Thinking => write!(f, "thinking"),
            ChatState::ToolCall => write!(f, "tool_call"),
            ChatState::Finished => write!(f, "finished"),
        }
    }
}

/// What a turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalResult {
    Text(String),
    Error(String),
}

impl FinalResult {
    pub fn is_error(&self) -> bool {
        matches!(self, FinalResult::Error(_))
    }

    /// The text shown to the user; errors are prefixed with `Error: `.
    pub fn into_display(self) -> String {
        match self {
            FinalResult::Text(text) => text,
            FinalResult::Error(message) => format!("Error: {message}"),
        }
    }
}

/// State carried through a single turn. Dropped when the turn ends.
///
/// `tool_call_count` only grows, and never past `max_tool_calls`; once the
/// state is `Finished` exactly one of `assistant_response` and
/// `error_message` is set.
#[derive(Debug, Clone)]
pub struct ConversationTurnState {
    pub chat_state: ChatState,
    pub tool_call_count: u32,
    pub max_tool_calls: u32,
    /// Tool requests refused before execution (unknown tool, bad arguments)
    pub rejected_requests: u32,
    pub pending_tool_name: Option<String>,
    pub pending_tool_args: Option<Value>,
    pub last_tool_outcome: Option<ToolResult>,
    pub error_message: Option<String>,
    pub assistant_response: Option<String>,
    /// Set when the answer came from the no-tools fallback completion
    pub used_fallback: bool,
}

impl ConversationTurnState {
    pub fn new(max_tool_calls: u32) -> Self {
        Self {
            chat_state: ChatState::Thinking,
            tool_call_count: 0,
            max_tool_calls,
            rejected_requests: 0,
            pending_tool_name: None,
            pending_tool_args: None,
            last_tool_outcome: None,
            error_message: None,
            assistant_response: None,
            used_fallback: false,
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        self.tool_call_count >= self.max_tool_calls
    }

    /// Rejections are bounded by the same budget as executions.
    pub fn rejections_exhausted(&self) -> bool {
        self.rejected_requests >= self.max_tool_calls
    }

    /// Thinking -> ToolCall with a validated request.
    pub fn request_tool(&mut self, name: impl Into<String>, arguments: Value) {
        self.pending_tool_name = Some(name.into());
        self.pending_tool_args = Some(arguments);
        self.chat_state = ChatState::ToolCall;
    }

    /// Take the pending request and charge it against the budget.
    ///
    /// Fails without touching the counter when the budget is already spent.
    pub fn begin_tool_call(&mut self) -> Result<(String, Value), TurnError> {
        if self.budget_exhausted() {
            return Err(TurnError::BudgetExhausted(self.tool_call_count));
        }
        let name = self.pending_tool_name.take().unwrap_or_default();
        let args = self.pending_tool_args.take().unwrap_or(Value::Object(Default::default()));
        self.tool_call_count += 1;
        Ok((name, args))
    }

    /// ToolCall -> Thinking with the tool's result.
    pub fn complete_tool_call(&mut self, result: ToolResult) {
        self.last_tool_outcome = Some(result);
        self.chat_state = ChatState::Thinking;
    }

    /// A request failed validation; stay in Thinking.
    pub fn reject_request(&mut self, result: ToolResult) {
        self.rejected_requests += 1;
        self.pending_tool_name = None;
        self.pending_tool_args = None;
        self.last_tool_outcome = Some(result);
        self.chat_state = ChatState::Thinking;
    }

    pub fn finish_with_response(&mut self, text: impl Into<String>) {
        self.assistant_response = Some(text.into());
        self.error_message = None;
        self.chat_state = ChatState::Finished;
    }

    pub fn finish_with_error(&mut self, err: &TurnError) {
        self.error_message = Some(err.to_string());
        self.assistant_response = None;
        self.chat_state = ChatState::Finished;
    }

    pub fn is_finished(&self) -> bool {
        self.chat_state == ChatState::Finished
    }

    pub fn final_result(&self) -> FinalResult {
        match (&self.assistant_response, &self.error_message) {
            (Some(text), _) => FinalResult::Text(text.clone()),
            (None, Some(message)) => FinalResult::Error(message.clone()),
            (None, None) => FinalResult::Error("turn ended without a response".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_calls_are_bounded() {
        let mut state = ConversationTurnState::new(1);
        state.request_tool("search", json!({"q": "x"}));
        assert_eq!(state.chat_state, ChatState::ToolCall);

        let (name, args) = state.begin_tool_call().unwrap();
        assert_eq!(name, "search");
        assert_eq!(args, json!({"q": "x"}));
        state.complete_tool_call(ToolResult::success("ok"));
        assert_eq!(state.chat_state, ChatState::Thinking);
        assert!(state.budget_exhausted());

        state.request_tool("search", json!({}));
        assert_eq!(state.begin_tool_call(), Err(TurnError::BudgetExhausted(1)));
        assert_eq!(state.tool_call_count, 1);
    }

    #[test]
    fn rejection_does_not_spend_budget() {
        let mut state = ConversationTurnState::new(2);
        state.reject_request(ToolResult::failure("unknown tool"));
        assert_eq!(state.tool_call_count, 0);
        assert_eq!(state.rejected_requests, 1);
        assert!(!state.rejections_exhausted());
        state.reject_request(ToolResult::failure("unknown tool"));
        assert!(state.rejections_exhausted());
    }

    #[test]
    fn finished_state_has_exactly_one_outcome() {
        let mut state = ConversationTurnState::new(3);
        state.finish_with_error(&TurnError::LlmInvocation("boom".into()));
        assert!(state.is_finished());
        assert_eq!(
            state.final_result(),
            FinalResult::Error("LLM invocation failed: boom".into())
        );

        state.finish_with_response("hello");
        assert_eq!(state.final_result(), FinalResult::Text("hello".into()));
        assert!(state.error_message.is_none());
    }

    #[test]
    fn error_display_is_prefixed() {
        assert_eq!(FinalResult::Error("x".into()).into_display(), "Error: x");
        assert_eq!(FinalResult::Text("hi".into()).into_display(), "hi");
    }
}
