//! Token estimation utilities.
//!
//! Character-based heuristic: ~4 characters per token, rounded up. The
//! estimate is monotonic in input length, which is all the compaction
//! policy relies on.

use chatloom_core::session::TurnPair;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() + 3) / 4
}

/// Estimate tokens for one history pair, including ~4 tokens of framing.
pub fn estimate_pair_tokens(pair: &TurnPair) -> usize {
    4 + estimate_tokens(&pair.user) + estimate_tokens(&pair.assistant)
}

/// Estimate tokens for a rolling summary plus the verbatim history.
pub fn estimate_memory_tokens<'a>(summary: &str, history: impl IntoIterator<Item = &'a TurnPair>) -> usize {
    estimate_tokens(summary) + history.into_iter().map(estimate_pair_tokens).sum::<usize>()
}
