//! Context block assembly.
//!
//! The system message the model sees on every Thinking step is built from
//! typed sections, always in this order:
//!
//! 1. **Preamble** (persona and house rules)
//! 2. **User profile** (known facts, `- key: value` lines)
//! 3. **Summary** (rolling summary of turns no longer kept verbatim)
//! 4. **Recent conversation** (verbatim history pairs, oldest first)
//! 5. **Tool result** (the last tool call and what to do next), only when present
//!
//! # Determinism
//!
//! Assembly is a pure function of its inputs: identical inputs always produce
//! identical output. No clock or random source is read, tool arguments are
//! rendered in sorted key order, and timestamps on history pairs are ignored.

use std::collections::VecDeque;
use std::fmt::Write as _;

use chatloom_core::profile::UserProfile;
use chatloom_core::session::TurnPair;
use chatloom_core::tool::ToolResult;
use serde_json::Value;

const DEFAULT_PREAMBLE: &str = "You are a helpful assistant. Use the user information, the summary \
and the recent conversation below to answer the user's latest message. When a tool can help, \
request it; otherwise answer directly.";

// ── Sections ──────────────────────────────────────────────────────────────

/// A tool call as it is reported back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallReport {
    pub tool_name: String,
    pub arguments: Value,
    pub result: ToolResult,
}

impl ToolCallReport {
    pub fn new(tool_name: impl Into<String>, arguments: Value, result: ToolResult) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            result,
        }
    }
}

/// What the model is told to do after a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Directive {
    /// Use the result however it sees fit.
    #[default]
    Proceed,
    /// The request is not complete yet; take the next step.
    Continue,
    /// Same as `Continue`, after the model already answered once without doing so.
    Insist,
    /// The tool budget is spent; answer now.
    Conclude,
}

/// The tool-result section of the context block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolResultSection {
    pub last_call: Option<ToolCallReport>,
    pub directive: Directive,
}

impl ToolResultSection {
    /// No tool has run yet this turn.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn after(report: ToolCallReport, directive: Directive) -> Self {
        Self {
            last_call: Some(report),
            directive,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_call.is_none() && self.directive == Directive::Proceed
    }

    /// Keep the last report but replace the instruction.
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directive = directive;
        self
    }
}

/// Everything one context block is built from.
#[derive(Debug, Clone, Copy)]
pub struct ContextSections<'a> {
    pub profile: &'a UserProfile,
    pub summary: &'a str,
    pub history: &'a VecDeque<TurnPair>,
    pub tool_result: &'a ToolResultSection,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds the system message for each LLM invocation.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    preamble: String,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self {
            preamble: DEFAULT_PREAMBLE.to_string(),
        }
    }

    /// Replace the persona/instructions paragraph at the top of every block.
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Render the context block.
    pub fn assemble(&self, sections: ContextSections<'_>) -> String {
        let mut out = String::new();
        out.push_str(self.preamble.trim());

        push_section(&mut out, "User information", &render_profile(sections.profile));
        push_section(&mut out, "Summary of earlier conversation", &render_summary(sections.summary));
        push_section(&mut out, "Recent conversation", &render_history(sections.history));

        if !sections.tool_result.is_empty() {
            out.push_str("\n\n");
            out.push_str(&render_tool_result(sections.tool_result));
        }

        out
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────

fn push_section(out: &mut String, title: &str, body: &str) {
    let _ = write!(out, "\n\n## {title}\n{body}");
}

fn render_profile(profile: &UserProfile) -> String {
    if profile.is_empty() {
        "Nothing is known about the user yet.".to_string()
    } else {
        profile.render()
    }
}

fn render_summary(summary: &str) -> String {
    let summary = summary.trim();
    if summary.is_empty() {
        "No earlier conversation.".to_string()
    } else {
        summary.to_string()
    }
}

fn render_history(history: &VecDeque<TurnPair>) -> String {
    if history.is_empty() {
        return "This is the start of the conversation.".to_string();
    }
    history
        .iter()
        .map(|pair| format!("user: {}\nassistant: {}", pair.user, pair.assistant))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_tool_result(section: &ToolResultSection) -> String {
    let mut out = String::new();

    if let Some(report) = &section.last_call {
        let heading = if report.result.is_success() {
            "Tool Call Executed"
        } else {
            "Tool Call Attempted"
        };
        let _ = writeln!(out, "## {heading}");
        let _ = writeln!(out, "- Tool: `{}`", report.tool_name);
        out.push_str(&render_arguments(&report.arguments));

        if report.result.is_success() {
            let _ = writeln!(out, "- Outcome: success");
            let _ = write!(out, "- Result:\n{}", report.result.detail.trim());
        } else {
            let _ = write!(out, "- Outcome: failure - {}", report.result.detail.trim());
        }
        out.push_str("\n\n");
    }

    let instruction = match (section.directive, section.last_call.as_ref()) {
        (Directive::Conclude, _) => {
            "## Tool Call Limit Reached\nDo not request any more tools. Conclude the conversation \
             with the user based on the information available."
        }
        (Directive::Continue, _) => {
            "The user's request is not complete yet. Continue with the next step (for example, \
             apply the requested change with the appropriate tool) before answering."
        }
        (Directive::Insist, _) => {
            "You answered without finishing the user's request. Call the tool that completes the \
             next step now; answer the user only after it has run."
        }
        (Directive::Proceed, Some(report)) if !report.result.is_success() => {
            "Tell the user what went wrong, or try a different approach."
        }
        (Directive::Proceed, _) => "Please proceed with the conversation using this result.",
    };
    out.push_str(instruction);
    out
}

fn render_arguments(arguments: &Value) -> String {
    match arguments {
        Value::Object(map) if map.is_empty() => "- Arguments: none\n".to_string(),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = String::from("- Arguments:\n");
            for key in keys {
                let _ = writeln!(out, "  - {key}: {}", render_value(&map[key]));
            }
            out
        }
        Value::Null => "- Arguments: none\n".to_string(),
        other => format!("- Arguments: {}\n", render_value(other)),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
