//! Decides whether a finished tool call should be followed by another step
//! before the model answers.
//!
//! Models tend to stop after a lookup ("I found your notes page!") even when
//! the user asked for something to be done with the result ("find my notes
//! page and add today's summary"). The heuristic spots those cases and the
//! orchestrator tells the model to continue.
//!
//! Rules are evaluated in order and the first match wins. The heuristic only
//! ever asks for continuation; a non-matching input leaves the decision to
//! the model.

use std::collections::HashSet;

/// What a matching rule asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainAction {
    ForceContinue,
    /// Stop evaluating and let the model decide.
    Defer,
}

/// One ordered chaining rule.
///
/// `tool_terms` are matched against the `_`-separated segments of the tool
/// name, `message_terms` against the words of the user's message (with simple
/// inflections: `add` matches `adds`, `added`, `adding`). An empty term list
/// matches anything.
#[derive(Debug, Clone)]
pub struct ChainRule {
    pub name: String,
    pub tool_terms: Vec<String>,
    pub message_terms: Vec<String>,
    pub action: ChainAction,
}

impl ChainRule {
    pub fn new(name: impl Into<String>, tool_terms: &[&str], message_terms: &[&str], action: ChainAction) -> Self {
        Self {
            name: name.into(),
            tool_terms: tool_terms.iter().map(|t| t.to_lowercase()).collect(),
            message_terms: message_terms.iter().map(|t| t.to_lowercase()).collect(),
            action,
        }
    }

    fn matches(&self, tool_segments: &HashSet<String>, message_words: &HashSet<String>) -> bool {
        let tool_hit = self.tool_terms.is_empty() || self.tool_terms.iter().any(|t| tool_segments.contains(t));
        let message_hit = self.message_terms.is_empty()
            || self
                .message_terms
                .iter()
                .any(|term| message_words.iter().any(|w| inflects(w, term)));
        tool_hit && message_hit
    }
}

const LOOKUP_TERMS: &[&str] = &["search", "read", "get", "list", "find", "lookup", "fetch"];
const WRITE_TERMS: &[&str] = &["add", "create", "update", "append", "write", "insert", "edit", "delete"];
const MODIFY_WORDS: &[&str] = &[
    "add", "append", "update", "create", "write", "insert", "edit", "modify", "change", "copy", "put", "save",
    "record", "move",
];

/// Ordered rule set consulted after every completed tool call.
#[derive(Debug, Clone)]
pub struct ChainingHeuristic {
    rules: Vec<ChainRule>,
}

impl Default for ChainingHeuristic {
    fn default() -> Self {
        Self::new(vec![
            // A write already happened: the model knows whether more is needed.
            ChainRule::new("after-write", WRITE_TERMS, &[], ChainAction::Defer),
            ChainRule::new("lookup-then-modify", LOOKUP_TERMS, MODIFY_WORDS, ChainAction::ForceContinue),
        ])
    }
}

impl ChainingHeuristic {
    pub fn new(rules: Vec<ChainRule>) -> Self {
        Self { rules }
    }

    /// A heuristic that never forces continuation.
    pub fn disabled() -> Self {
        Self { rules: Vec::new() }
    }

    /// True when the model should be told to take another step after
    /// `last_tool_name` ran for `user_message`.
    pub fn should_force_continue(&self, last_tool_name: &str, user_message: &str) -> bool {
        let tool_segments: HashSet<String> = last_tool_name
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let message_words: HashSet<String> = user_message
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if tool_segments.is_empty() {
            return false;
        }

        self.rules
            .iter()
            .find(|rule| rule.matches(&tool_segments, &message_words))
            .is_some_and(|rule| {
                tracing::debug!(rule = %rule.name, tool = last_tool_name, "Chaining rule matched");
                rule.action == ChainAction::ForceContinue
            })
    }
}

/// `word` is `term` or a regular inflection of it.
fn inflects(word: &str, term: &str) -> bool {
    if word == term {
        return true;
    }
    let Some(rest) = word.strip_prefix(term) else {
        // "create" -> "creating"
        return term
            .strip_suffix('e')
            .and_then(|stem| word.strip_prefix(stem))
            .is_some_and(|rest| rest == "ing");
    };
    if matches!(rest, "s" | "es" | "ed" | "d" | "ing") {
        return true;
    }
    // "add" -> "added"/"adding" handled above; "put" -> "putting"
    let last = term.chars().last();
    last.is_some_and(|c| {
        let doubled = format!("{c}ing");
        let doubled_ed = format!("{c}ed");
        rest == doubled || rest == doubled_ed
    })
}
