//! Rolling-summary generation.
//!
//! [`LlmSummarizer`] asks the summary model to merge evicted pairs into the
//! existing summary. [`ExtractiveSummarizer`] is the deterministic fallback:
//! it never fails, so an evicted pair always leaves a trace in the summary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatloom_core::error::ProviderError;
use chatloom_core::message::Message;
use chatloom_core::provider::{Provider, ProviderRequest};
use chatloom_core::session::TurnPair;

use crate::context::token;

/// Folds conversation pairs into a rolling summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    /// Merge `folded` into `previous`, aiming for at most `max_tokens`.
    async fn summarize(
        &self,
        previous: &str,
        folded: &[TurnPair],
        max_tokens: usize,
    ) -> Result<String, ProviderError>;
}

// ── LLM ───────────────────────────────────────────────────────────────────

pub struct LlmSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    timeout: Duration,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn prompt(previous: &str, folded: &[TurnPair], max_tokens: usize) -> (String, String) {
        // ~0.75 words per token
        let max_words = (max_tokens * 3 / 4).max(20);
        let system = format!(
            "You maintain a running summary of a conversation between a user and an assistant. \
             Merge the new exchanges into the existing summary. Keep facts about the user, \
             decisions made and open tasks; drop small talk. Reply with the summary only, in at \
             most {max_words} words."
        );

        let existing = if previous.trim().is_empty() {
            "(none)"
        } else {
            previous.trim()
        };
        let exchanges = if folded.is_empty() {
            "(none, condense the existing summary)".to_string()
        } else {
            folded
                .iter()
                .map(|p| format!("user: {}\nassistant: {}", p.user, p.assistant))
                .collect::<Vec<_>>()
                .join("\n")
        };
        (system, format!("Existing summary:\n{existing}\n\nNew exchanges:\n{exchanges}"))
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn summarize(
        &self,
        previous: &str,
        folded: &[TurnPair],
        max_tokens: usize,
    ) -> Result<String, ProviderError> {
        let (system, user) = Self::prompt(previous, folded, max_tokens);
        let request = ProviderRequest::new(&self.model, vec![Message::system(system), Message::user(user)])
            .with_temperature(0.0);

        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| ProviderError::Timeout(format!("summary request exceeded {}s", self.timeout.as_secs())))??;

        let text = response.message.content.trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse("empty summary".into()));
        }
        Ok(text)
    }
}

// ── Extractive ────────────────────────────────────────────────────────────

/// Appends one short line per folded pair and keeps the newest lines that fit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

const EXCERPT_CHARS: usize = 160;

impl ExtractiveSummarizer {
    pub fn fold(previous: &str, folded: &[TurnPair], max_tokens: usize) -> String {
        let mut lines: Vec<String> = previous
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        for pair in folded {
            lines.push(format!(
                "- The user said \"{}\"; the assistant replied \"{}\".",
                excerpt(&pair.user),
                excerpt(&pair.assistant)
            ));
        }
        clip(&lines.join("\n"), max_tokens)
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(
        &self,
        previous: &str,
        folded: &[TurnPair],
        max_tokens: usize,
    ) -> Result<String, ProviderError> {
        Ok(Self::fold(previous, folded, max_tokens))
    }
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{cut}…")
}

/// Shrink `text` to at most `max_tokens` estimated tokens, dropping the
/// oldest lines first and cutting the last survivor if it is still too long.
pub fn clip(text: &str, max_tokens: usize) -> String {
    if token::estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }

    let lines: Vec<&str> = text.lines().collect();
    for start in 1..lines.len() {
        let candidate = lines[start..].join("\n");
        if token::estimate_tokens(&candidate) <= max_tokens {
            return candidate;
        }
    }

    let last = lines.last().copied().unwrap_or_default();
    last.chars()
        .scan(0usize, |bytes, c| {
            *bytes += c.len_utf8();
            (*bytes <= max_tokens * 4).then_some(c)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    #[test]
    fn extractive_keeps_every_folded_pair() {
        let pairs = vec![TurnPair::new("I live in Berlin", "Nice!"), TurnPair::new("I like tea", "Noted.")];
        let summary = ExtractiveSummarizer::fold("- Earlier: greetings.", &pairs, 500);
        assert!(summary.starts_with("- Earlier: greetings."));
        assert!(summary.contains("\"I live in Berlin\""));
        assert!(summary.contains("\"I like tea\""));
    }

    #[test]
    fn clip_drops_oldest_lines_first() {
        let text = "old line one\nold line two\nnewest line";
        assert_eq!(clip(text, 3), "newest line");
        assert_eq!(clip(text, 100), text);
        assert!(token::estimate_tokens(&clip(&"x".repeat(400), 10)) <= 10);
    }

    #[test]
    fn excerpt_flattens_and_cuts() {
        assert_eq!(excerpt("a\n  b"), "a b");
        assert_eq!(excerpt(&"y".repeat(500)).chars().count(), EXCERPT_CHARS + 1);
    }

    #[tokio::test]
    async fn llm_summarizer_uses_summary_model_without_tools() {
        let provider = Arc::new(ScriptedProvider::with_texts(&["User lives in Berlin."]));
        let summarizer = LlmSummarizer::new(provider.clone(), "gpt-4o-mini");

        let summary = summarizer
            .summarize("", &[TurnPair::new("I live in Berlin", "Nice!")], 100)
            .await
            .unwrap();
        assert_eq!(summary, "User lives in Berlin.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4o-mini");
        assert!(requests[0].tools.is_empty());
        assert!(requests[0].messages[1].content.contains("user: I live in Berlin"));
    }

    #[tokio::test]
    async fn llm_summarizer_rejects_empty_text() {
        let provider = Arc::new(ScriptedProvider::with_texts(&["   "]));
        let summarizer = LlmSummarizer::new(provider, "m");
        let err = summarizer.summarize("", &[], 100).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
