//! Match metrics.
//!
//! Collected by [`RuleMatcher::mparse_with_metrics`](super::RuleMatcher::mparse_with_metrics)
//! for the verbose API and the CLI report. The plain `mparse` path collects
//! the counters too (they are cheap) but throws them away.

use std::time::Duration;

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct MatchMetrics {
    /// Total elapsed time for the whole `mparse` call.
    pub total: Duration,
    /// One entry per start rule that was tried.
    pub rules: Vec<RuleMetrics>,
}

/// Counters for matching one start rule.
#[derive(Debug, Default, Clone)]
pub struct RuleMetrics {
    pub rule: String,
    pub duration: Duration,
    /// Number of recursive match calls.
    pub calls: usize,
    /// Deepest reference nesting reached.
    pub max_depth: usize,
    /// Partial results returned by the start rule, full or not.
    pub candidates: usize,
    /// Candidates that consumed the whole input.
    pub full: usize,
}

impl MatchMetrics {
    pub fn calls(&self) -> usize {
        self.rules.iter().map(|r| r.calls).sum()
    }

    pub fn full_parses(&self) -> usize {
        self.rules.iter().map(|r| r.full).sum()
    }
}
