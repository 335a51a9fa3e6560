//! Tool-call interpretation of a single model choice.
//!
//! Two paths: the structured `tool_calls` list, or, when that is empty, an
//! inline fallback where the whole trimmed content is `<tool>{json}`.
//! Calls naming an unknown tool or carrying non-object arguments are
//! rejected here and never reach the sandbox.

use std::sync::LazyLock;

use crate::tools::names::is_known_tool;
use crate::{CompletionChoice, ToolCall};
use regex::Regex;

static INLINE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\s*([a-zA-Z][a-zA-Z0-9_]*)\s*(\{.*\})\s*\z")
        .expect("inline tool-call regex must compile")
});

/// A validated call, ready for the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    /// Provider id, or a synthesized one for inline calls.
    pub id: String,
    pub name: String,
    /// JSON object text.
    pub arguments: String,
    /// Whether this came from the inline fallback.
    pub inline: bool,
}

impl ToolCallRequest {
    /// The call as it is recorded on the assistant message.
    pub fn to_tool_call(&self) -> ToolCall {
        ToolCall::new(&self.id, &self.name, &self.arguments)
    }
}

/// A structured call that was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCall {
    pub name: String,
    pub reason: String,
}

/// Outcome of interpreting one choice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpretation {
    /// Accepted calls, in request order.
    pub calls: Vec<ToolCallRequest>,
    pub rejected: Vec<RejectedCall>,
}

impl Interpretation {
    pub fn has_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    pub fn is_inline(&self) -> bool {
        self.calls.iter().any(|c| c.inline)
    }
}

/// Classify `choice`. `inline_id` is used as the id of an inline call.
pub fn interpret(choice: &CompletionChoice, inline_id: &str) -> Interpretation {
    if !choice.tool_calls.is_empty() {
        let mut out = Interpretation::default();
        for call in &choice.tool_calls {
            match validate_call(&call.function.name, &call.function.arguments) {
                Ok(arguments) => out.calls.push(ToolCallRequest {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    arguments,
                    inline: false,
                }),
                Err(reason) => out.rejected.push(RejectedCall {
                    name: call.function.name.clone(),
                    reason,
                }),
            }
        }
        return out;
    }

    let calls = choice
        .content
        .as_deref()
        .and_then(parse_inline_tool_call)
        .map(|(name, arguments)| ToolCallRequest {
            id: inline_id.to_string(),
            name,
            arguments,
            inline: true,
        })
        .into_iter()
        .collect();

    Interpretation {
        calls,
        rejected: Vec::new(),
    }
}

/// Check a structured call; returns the arguments to execute with.
fn validate_call(name: &str, arguments: &str) -> Result<String, String> {
    if !is_known_tool(name) {
        return Err(format!("unknown tool '{name}'"));
    }
    let arguments = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    match serde_json::from_str::<serde_json::Value>(arguments) {
        Ok(serde_json::Value::Object(_)) => Ok(arguments.to_string()),
        Ok(_) => Err("arguments are not a JSON object".into()),
        Err(e) => Err(format!("malformed JSON arguments: {e}")),
    }
}

/// Match `<known tool>{json object}` spanning the whole trimmed text.
/// Returns the tool name and the compact JSON arguments.
pub fn parse_inline_tool_call(content: &str) -> Option<(String, String)> {
    let caps = INLINE_CALL.captures(content)?;
    let name = caps.get(1)?.as_str();
    if !is_known_tool(name) {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(caps.get(2)?.as_str()).ok()? {
        value @ serde_json::Value::Object(_) => Some((name.to_string(), value.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::names::KNOWN_TOOLS;

    fn structured(calls: Vec<ToolCall>) -> CompletionChoice {
        CompletionChoice::tool_calls(calls)
    }

    #[test]
    fn structured_calls_pass_through_in_order() {
        let choice = structured(vec![
            ToolCall::new("a", "read", r#"{"path": "x"}"#),
            ToolCall::new("b", "ls", ""),
        ]);
        let out = interpret(&choice, "inline-1");
        assert_eq!(out.calls.len(), 2);
        assert_eq!(out.calls[0].id, "a");
        assert_eq!(out.calls[1].name, "ls");
        assert_eq!(out.calls[1].arguments, "{}");
        assert!(!out.is_inline());
    }

    #[test]
    fn unknown_and_malformed_calls_rejected_others_kept() {
        let choice = structured(vec![
            ToolCall::new("a", "rm_rf", "{}"),
            ToolCall::new("b", "grep", r#"{"pat": "x"}"#),
            ToolCall::new("c", "read", "[1, 2]"),
            ToolCall::new("d", "bash", "{not json"),
        ]);
        let out = interpret(&choice, "inline-1");
        assert_eq!(out.calls.len(), 1);
        assert_eq!(out.calls[0].id, "b");
        assert_eq!(out.rejected.len(), 3);
        assert_eq!(out.rejected[0].name, "rm_rf");
    }

    #[test]
    fn never_returns_unknown_names() {
        let names = ["ls", "LS", "read_file", "shell", "", "grep", "bash2", "edit"];
        let calls = names
            .iter()
            .enumerate()
            .map(|(i, n)| ToolCall::new(format!("c{i}"), *n, "{}"))
            .collect();
        let out = interpret(&structured(calls), "inline-1");
        assert!(out.calls.iter().all(|c| KNOWN_TOOLS.contains(&c.name.as_str())));
        assert_eq!(out.calls.len(), 3);

        for name in names {
            let text = CompletionChoice::text(format!("{name}{{}}"));
            let out = interpret(&text, "inline-1");
            assert!(out.calls.iter().all(|c| KNOWN_TOOLS.contains(&c.name.as_str())));
        }
    }

    #[test]
    fn inline_call_recognized_with_synthesized_id() {
        let choice = CompletionChoice::text("  read {\"path\": \"src/main.rs\"}\n");
        let out = interpret(&choice, "inline-3");
        assert_eq!(
            out.calls,
            vec![ToolCallRequest {
                id: "inline-3".into(),
                name: "read".into(),
                arguments: r#"{"path":"src/main.rs"}"#.into(),
                inline: true,
            }]
        );
    }

    #[test]
    fn inline_multiline_payload() {
        let parsed = parse_inline_tool_call("write{\n  \"path\": \"a\",\n  \"content\": \"b\"\n}");
        assert_eq!(parsed.map(|(n, _)| n), Some("write".to_string()));
    }

    #[test]
    fn inline_rejects_non_objects_and_extra_text() {
        assert_eq!(parse_inline_tool_call("ls[]"), None);
        assert_eq!(parse_inline_tool_call("ls{broken"), None);
        assert_eq!(parse_inline_tool_call("Sure! ls{}"), None);
        assert_eq!(parse_inline_tool_call("ls{} then read{}"), None);
        assert_eq!(parse_inline_tool_call("ls{}ls{}"), None);
        assert_eq!(parse_inline_tool_call("unknown{}"), None);
        assert_eq!(parse_inline_tool_call(""), None);
    }

    #[test]
    fn plain_text_has_no_calls() {
        let out = interpret(&CompletionChoice::text("Here are the files."), "inline-1");
        assert!(!out.has_calls());
    }
}
