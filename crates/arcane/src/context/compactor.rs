//! History compaction: shrink old tool results once the estimated token
//! cost exceeds the budget.
//!
//! The first message and the trailing window are never touched. Between
//! them, `Tool` messages longer than the truncate size are rewritten to
//! `[<n> lines] <preview>...`. Message count and order never change, and
//! compacted content is recognized so a second pass is a no-op.

use std::sync::LazyLock;

use crate::tools::core::truncate_chars;
use crate::{Message, MessageRole};
use regex::Regex;

/// Token budget when the model's context length is unknown.
pub const DEFAULT_CONTEXT_TOKENS: usize = 80_000;

/// Trailing messages kept verbatim in agent mode.
pub const AGENT_TRAILING_KEEP: usize = 6;

/// Tool results longer than this are truncated in the middle window.
pub const TOOL_RESULT_TRUNCATE_SIZE: usize = 500;

/// Characters per estimated token.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

static COMPACTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A(\[\d+ lines\] ).*\.\.\.\z").expect("compacted-marker regex must compile")
});

/// Compaction settings. Read-only during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionPolicy {
    pub token_budget: usize,
    pub trailing_keep: usize,
    pub tool_result_truncate_size: usize,
    pub chars_per_token: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self::agent()
    }
}

impl CompactionPolicy {
    pub fn agent() -> Self {
        Self {
            token_budget: DEFAULT_CONTEXT_TOKENS,
            trailing_keep: AGENT_TRAILING_KEEP,
            tool_result_truncate_size: TOOL_RESULT_TRUNCATE_SIZE,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }

    pub fn with_token_budget(mut self, tokens: usize) -> Self {
        self.token_budget = tokens;
        self
    }

    pub fn with_trailing_keep(mut self, keep: usize) -> Self {
        self.trailing_keep = keep;
        self
    }
}

/// Rough token cost of one message: its JSON form divided by
/// `chars_per_token`.
pub fn estimate_message_tokens(message: &Message, chars_per_token: usize) -> usize {
    let chars = serde_json::to_string(message).map_or(0, |s| s.chars().count());
    chars / chars_per_token.max(1)
}

/// Rough token cost of a message list.
pub fn estimate_tokens(messages: &[Message], chars_per_token: usize) -> usize {
    messages
        .iter()
        .map(|m| estimate_message_tokens(m, chars_per_token))
        .sum()
}

/// Result of a compaction pass.
#[derive(Debug, Clone)]
pub struct Compaction {
    pub messages: Vec<Message>,
    /// Estimated tokens before compaction.
    pub tokens_before: usize,
    /// Number of tool results rewritten.
    pub truncated: usize,
}

impl Compaction {
    pub fn changed(&self) -> bool {
        self.truncated > 0
    }
}

/// Compact `history` under `policy`. Pure: the input is not modified.
pub fn compact(history: &[Message], policy: &CompactionPolicy) -> Compaction {
    let tokens_before = estimate_tokens(history, policy.chars_per_token);
    let unchanged = || Compaction {
        messages: history.to_vec(),
        tokens_before,
        truncated: 0,
    };

    if tokens_before < policy.token_budget || history.len() <= policy.trailing_keep + 1 {
        return unchanged();
    }

    let middle_end = history.len() - policy.trailing_keep;
    let mut truncated = 0;
    let messages = history
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            if i == 0 || i >= middle_end {
                return msg.clone();
            }
            match shrink_tool_result(msg, policy.tool_result_truncate_size) {
                Some(shrunk) => {
                    truncated += 1;
                    shrunk
                }
                None => msg.clone(),
            }
        })
        .collect();

    Compaction {
        messages,
        tokens_before,
        truncated,
    }
}

fn shrink_tool_result(msg: &Message, limit: usize) -> Option<Message> {
    if msg.role != MessageRole::Tool {
        return None;
    }
    let content = msg.content.as_deref()?;
    if content.chars().count() <= limit || is_compacted(content, limit) {
        return None;
    }
    Some(Message {
        content: Some(truncate_tool_result(content, limit)),
        ..msg.clone()
    })
}

/// `[<n> lines] <first limit chars>...`
pub fn truncate_tool_result(content: &str, limit: usize) -> String {
    let lines = content.split('\n').count();
    let preview = truncate_chars(content, limit);
    format!("[{lines} lines] {}...", preview.trim())
}

/// Whether `content` is already in compacted form for `limit`. A tool
/// result merely shaped like the marker but longer than a `limit`-char
/// preview still counts as uncompacted.
pub fn is_compacted(content: &str, limit: usize) -> bool {
    let Some(caps) = COMPACTED.captures(content) else {
        return false;
    };
    let prefix = caps.get(1).map_or(0, |m| m.as_str().chars().count());
    content.chars().count() <= prefix + limit + "...".len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;

    fn tight_policy() -> CompactionPolicy {
        CompactionPolicy::agent().with_token_budget(10).with_trailing_keep(2)
    }

    fn long_history() -> Vec<Message> {
        vec![
            Message::user("initial task"),
            Message::assistant_tool_calls(vec![ToolCall::new("c1", "read", r#"{"path":"a"}"#)]),
            Message::tool_result("c1", "line\n".repeat(400)),
            Message::assistant_tool_calls(vec![ToolCall::new("c2", "read", r#"{"path":"b"}"#)]),
            Message::tool_result("c2", "short"),
            Message::assistant_tool_calls(vec![ToolCall::new("c3", "read", r#"{"path":"c"}"#)]),
            Message::tool_result("c3", "z".repeat(2000)),
        ]
    }

    #[test]
    fn under_budget_is_identity() {
        let history = long_history();
        let out = compact(&history, &CompactionPolicy::agent());
        assert_eq!(out.messages, history);
        assert!(!out.changed());
    }

    #[test]
    fn short_history_is_identity_even_over_budget() {
        let history = vec![
            Message::user("x".repeat(10_000)),
            Message::tool_result("c", "y".repeat(10_000)),
        ];
        let out = compact(&history, &tight_policy());
        assert_eq!(out.messages, history);
    }

    #[test]
    fn preserves_first_and_trailing_window() {
        let history = long_history();
        let policy = tight_policy();
        let out = compact(&history, &policy);

        assert_eq!(out.messages.len(), history.len());
        assert_eq!(out.messages[0], history[0]);
        let tail = history.len() - policy.trailing_keep;
        assert_eq!(out.messages[tail..], history[tail..]);
    }

    #[test]
    fn truncates_only_long_middle_tool_results() {
        let history = long_history();
        let out = compact(&history, &tight_policy());

        let first = out.messages[2].text();
        assert!(first.starts_with("[401 lines] line\nline"), "{first}");
        assert!(first.ends_with("..."));
        assert_eq!(out.messages[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(out.messages[4].text(), "short");
        assert_eq!(out.messages[1], history[1]);
        assert_eq!(out.truncated, 1);
    }

    #[test]
    fn compaction_is_idempotent() {
        let policy = tight_policy();
        let once = compact(&long_history(), &policy);
        let twice = compact(&once.messages, &policy);
        assert_eq!(once.messages, twice.messages);
        assert_eq!(twice.truncated, 0);
    }

    #[test]
    fn oversized_marker_lookalike_is_still_truncated() {
        let lookalike = format!("[3 lines] {}...", "q".repeat(5000));
        let mut history = long_history();
        history[2] = Message::tool_result("c1", lookalike.clone());
        let out = compact(&history, &tight_policy().with_token_budget(1));

        let shrunk = out.messages[2].text();
        assert!(shrunk.chars().count() < lookalike.chars().count());
        assert!(shrunk.starts_with("[1 lines] [3 lines] qqq"), "{shrunk}");
        assert_eq!(out.truncated, 1);
    }

    #[test]
    fn truncation_is_char_safe() {
        let out = truncate_tool_result(&"é".repeat(600), 500);
        assert_eq!(out, format!("[1 lines] {}...", "é".repeat(500)));
        assert!(is_compacted(&out, 500));
    }

    #[test]
    fn estimate_uses_serialized_length() {
        let msg = Message::user("abcd");
        let json_len = serde_json::to_string(&msg).unwrap().len();
        assert_eq!(estimate_message_tokens(&msg, 4), json_len / 4);
        assert_eq!(estimate_tokens(&[msg.clone(), msg], 4), 2 * (json_len / 4));
    }

    #[test]
    fn default_policy_is_agent() {
        assert_eq!(CompactionPolicy::default().trailing_keep, AGENT_TRAILING_KEEP);
    }
}
