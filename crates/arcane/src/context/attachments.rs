//! `@file` mentions in user input.
//!
//! `@path` or `@"path with spaces"` attaches an existing file's contents to
//! the outgoing user message. Mentions that don't name a file are left in
//! the text as typed.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Attached files longer than this are cut.
pub const MAX_ATTACHMENT_LINES: usize = 500;

static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@("([^"]+)"|([^\s]+))"#).expect("mention regex must compile")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex must compile"));

/// User input with its file mentions resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mentions {
    /// Input with resolved mentions removed and whitespace collapsed.
    pub text: String,
    /// Mentioned paths that exist, as typed, in order, deduplicated.
    pub files: Vec<String>,
}

/// Find mentions in `input` naming files that exist under `workdir`.
pub fn extract_file_mentions(input: &str, workdir: &Path) -> Mentions {
    let mut files: Vec<String> = Vec::new();
    for caps in MENTION.captures_iter(input) {
        let Some(name) = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()) else {
            continue;
        };
        if !files.iter().any(|f| f == name) && resolve(workdir, name).is_file() {
            files.push(name.to_string());
        }
    }

    let stripped = MENTION.replace_all(input, |caps: &regex::Captures<'_>| {
        let name = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        if files.iter().any(|f| f == name) {
            String::new()
        } else {
            caps[0].to_string()
        }
    });
    let text = WHITESPACE.replace_all(stripped.trim(), " ").into_owned();

    Mentions { text, files }
}

/// Render attached files as a markdown block to append to the user message.
pub fn build_file_context(files: &[String], workdir: &Path) -> String {
    if files.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n\n# Attached Files\n");
    for file in files {
        let path = resolve(workdir, file);
        let Ok(bytes) = std::fs::read(&path) else {
            debug!("skipping unreadable attachment {}", path.display());
            continue;
        };
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.split('\n').collect();
        let body = if lines.len() > MAX_ATTACHMENT_LINES {
            format!(
                "{}\n\n[... truncated, {} more lines]",
                lines[..MAX_ATTACHMENT_LINES].join("\n"),
                lines.len() - MAX_ATTACHMENT_LINES
            )
        } else {
            text.into_owned()
        };
        out.push_str(&format!("\n## {file}\n```\n{body}\n```\n"));
    }
    out
}

/// Resolve mentions and append attached file contents to `input`.
pub fn expand_mentions(input: &str, workdir: &Path) -> String {
    let mentions = extract_file_mentions(input, workdir);
    if mentions.files.is_empty() {
        return input.to_string();
    }
    format!(
        "{}{}",
        mentions.text,
        build_file_context(&mentions.files, workdir)
    )
}

fn resolve(workdir: &Path, name: &str) -> PathBuf {
    let p = Path::new(name);
    if p.is_absolute() { p.to_path_buf() } else { workdir.join(p) }
}
