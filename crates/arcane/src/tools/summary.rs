//! One-line, human-readable summaries of tool calls for the UI.
//!
//! Summaries are display-only and never enter the model's history.

use std::path::Path;

use crate::tools::fs::EMPTY_DIR;
use crate::tools::names;
use crate::tools::search::NONE;

/// Commands longer than this are elided in `BASH` summaries.
const MAX_SUMMARY_CMD: usize = 30;

/// Summarize a finished call from its raw arguments and result text.
pub fn summarize_tool_call(name: &str, arguments: &str, result: &str) -> String {
    let args: serde_json::Value = serde_json::from_str(arguments).unwrap_or_default();
    let arg = |key: &str| args.get(key).and_then(|v| v.as_str()).unwrap_or("");

    match name {
        names::READ => {
            let lines = result.lines().filter(|l| is_numbered_line(l)).count();
            format!("READ {} ({lines} lines)", basename(arg("path")))
        }
        names::WRITE => {
            let lines = arg("content").matches('\n').count() + 1;
            format!("WRITE {} ({lines} lines)", basename(arg("path")))
        }
        names::EDIT => {
            if result.starts_with("error") {
                format!("EDIT {} (failed)", basename(arg("path")))
            } else {
                format!("EDIT {}", basename(arg("path")))
            }
        }
        names::GLOB => format!("GLOB {} ({} files)", arg("pat"), count_hits(result)),
        names::GREP => format!("GREP \"{}\" ({} matches)", arg("pat"), count_hits(result)),
        names::BASH => format!("BASH {}", elide_command(arg("cmd"))),
        names::LS => {
            let path = match arg("path") {
                "" => ".",
                p => p,
            };
            let entries = if result == EMPTY_DIR || result.starts_with("error") {
                0
            } else {
                result.lines().filter(|l| !l.trim().is_empty()).count()
            };
            format!("LS {path} ({entries} entries)")
        }
        other => format!("{} called", other.to_uppercase()),
    }
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn is_numbered_line(line: &str) -> bool {
    line.split_once("| ")
        .or_else(|| line.split_once('|'))
        .is_some_and(|(n, _)| {
            let n = n.trim();
            !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())
        })
}

/// Result lines for glob/grep, ignoring sentinels, errors and notices.
fn count_hits(result: &str) -> usize {
    if result == NONE || result.starts_with("error") {
        return 0;
    }
    result
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with("[Results limited"))
        .count()
}

fn elide_command(cmd: &str) -> String {
    if cmd.chars().count() > MAX_SUMMARY_CMD {
        let head: String = cmd.chars().take(MAX_SUMMARY_CMD - 3).collect();
        format!("{head}...")
    } else {
        cmd.to_string()
    }
}
