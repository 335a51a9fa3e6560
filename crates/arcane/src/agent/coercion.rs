//! Final-answer coercion.
//!
//! Models sometimes finish with an empty answer, an unexecuted inline call,
//! or a claim that the directory is empty right after `ls` listed entries.
//! In those cases the last `ls` result is rendered as the answer instead.
//! Pure functions over the turn's execution records.

use crate::agent::events::ToolExecutionRecord;
use crate::agent::interpret::parse_inline_tool_call;
use crate::tools::fs::EMPTY_DIR;
use crate::tools::names;

const EMPTY_ANSWER: &str = "The current directory is empty.";

/// Phrases treated as a claim that the directory has no entries.
const EMPTY_CLAIMS: [&str; 3] = ["no files", "directory appears to be empty", "directory is empty"];

/// Result of the most recent call to `tool`, failed or not.
pub fn last_tool_result<'a>(records: &'a [ToolExecutionRecord], tool: &str) -> Option<&'a str> {
    records
        .iter()
        .rev()
        .find(|r| r.name == tool)
        .map(|r| r.result.as_str())
}

/// The most recent `ls` listing, or `None` when that call failed. An older
/// listing may describe another directory, so it is never used instead.
fn last_listing(records: &[ToolExecutionRecord]) -> Option<&str> {
    last_tool_result(records, names::LS).filter(|r| !r.starts_with("error:"))
}

/// Render an `ls` result as a bulleted answer.
pub fn format_ls_result_as_answer(ls_result: &str) -> String {
    let items: Vec<&str> = ls_result
        .lines()
        .map(str::trim)
        .map(|l| l.strip_prefix("[FILE]").unwrap_or(l))
        .map(|l| l.strip_prefix("[DIR]").unwrap_or(l))
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != EMPTY_DIR)
        .collect();

    if items.is_empty() {
        return EMPTY_ANSWER.to_string();
    }

    let mut out = String::from("Entries in the current directory:");
    for item in items {
        out.push_str("\n- ");
        out.push_str(item);
    }
    out
}

/// Replace an unusable final answer with the last `ls` listing.
pub fn coerce_final_content(content: &str, records: &[ToolExecutionRecord]) -> String {
    let trimmed = content.trim();
    let last_ls = last_listing(records);

    if trimmed.is_empty() || parse_inline_tool_call(trimmed).is_some() {
        return match last_ls {
            Some(ls) => format_ls_result_as_answer(ls),
            None => content.to_string(),
        };
    }

    let lower = trimmed.to_lowercase();
    if EMPTY_CLAIMS.iter().any(|claim| lower.contains(claim))
        && let Some(ls) = last_ls
    {
        let ls = ls.trim();
        if !ls.is_empty() && ls != EMPTY_DIR {
            return format_ls_result_as_answer(ls);
        }
    }

    content.to_string()
}
