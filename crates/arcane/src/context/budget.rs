//! Context usage snapshots for logging and turn results.

use crate::Message;
use crate::context::compactor::{CompactionPolicy, estimate_tokens};

/// Snapshot of estimated context usage against the compaction budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextUsage {
    pub estimated_tokens: usize,
    pub max_tokens: usize,
    /// Fraction of the budget in use (may exceed 1.0).
    pub usage_pct: f64,
}

impl ContextUsage {
    pub fn measure(messages: &[Message], policy: &CompactionPolicy) -> Self {
        let estimated_tokens = estimate_tokens(messages, policy.chars_per_token);
        let usage_pct = if policy.token_budget > 0 {
            estimated_tokens as f64 / policy.token_budget as f64
        } else {
            1.0
        };
        Self {
            estimated_tokens,
            max_tokens: policy.token_budget,
            usage_pct,
        }
    }

    pub fn over_budget(&self) -> bool {
        self.estimated_tokens >= self.max_tokens
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {})",
            self.estimated_tokens,
            self.usage_pct * 100.0,
            self.max_tokens,
        )
    }
}
