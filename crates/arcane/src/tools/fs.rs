//! File tools: `ls`, `read`, `write`, `edit`.
//!
//! Each tool holds the working directory that relative paths resolve
//! against. Output limits are module constants; they bound what re-enters
//! the model's context.

use std::path::PathBuf;
use tokio::fs;

use crate::ToolDef;
use crate::error::ToolError;
use crate::json_schema_for;
use crate::tools::core::{Tool, ToolFuture, parse_tool_args, resolve_path, truncate_chars};
use crate::tools::names;
use schemars::JsonSchema;
use serde::Deserialize;

// ── Limits ──────────────────────────────────────────────────────────

/// Lines returned by `read` when no limit is given.
pub const DEFAULT_READ_LIMIT: usize = 200;

/// Longer lines are cut and suffixed with `...`.
pub const MAX_LINE_WIDTH: usize = 500;

/// Sentinel returned by `ls` for an empty directory.
pub const EMPTY_DIR: &str = "(empty directory)";

/// Success marker for `write` and `edit`.
pub const OK: &str = "ok";

// ── Typed argument structs ──────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct LsArgs {
    /// Directory to list (defaults to the working directory).
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
pub struct ReadArgs {
    /// File path (not a directory).
    pub path: String,
    /// Zero-based line to start from.
    #[serde(default)]
    pub offset: Option<usize>,
    /// Maximum number of lines (default 200).
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
pub struct WriteArgs {
    pub path: String,
    pub content: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct EditArgs {
    pub path: String,
    /// Exact text to replace.
    pub old: String,
    /// Replacement text.
    pub new: String,
    /// Replace every occurrence instead of requiring a unique match.
    #[serde(default)]
    pub all: Option<bool>,
}

// ── Ls ──────────────────────────────────────────────────────────────

/// List the immediate entries of a directory, sorted by name.
pub struct Ls {
    workdir: PathBuf,
}

impl Ls {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for Ls {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            names::LS,
            "List files and directories in a path (defaults to current directory)",
            json_schema_for::<LsArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<LsArgs>(arguments);
        Box::pin(async move {
            let args = parsed?;
            let dir = resolve_path(&self.workdir, args.path.as_deref().unwrap_or("."));
            let mut reader = fs::read_dir(&dir)
                .await
                .map_err(|e| ToolError::io("open", &dir, e))?;

            let mut entries: Vec<(String, bool)> = Vec::new();
            while let Some(entry) = reader
                .next_entry()
                .await
                .map_err(|e| ToolError::io("read", &dir, e))?
            {
                let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
                entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
            }
            entries.sort();

            Ok(format_listing(&entries))
        })
    }
}

/// Render `(name, is_dir)` pairs the way `ls` reports them.
pub fn format_listing(entries: &[(String, bool)]) -> String {
    if entries.is_empty() {
        return EMPTY_DIR.to_string();
    }
    let mut out = String::new();
    for (name, is_dir) in entries {
        if *is_dir {
            out.push_str(&format!("[DIR]  {name}/\n"));
        } else {
            out.push_str(&format!("[FILE] {name}\n"));
        }
    }
    out
}

// ── Read ────────────────────────────────────────────────────────────

/// Read a file with line numbers, a line cap and a continuation hint.
pub struct Read {
    workdir: PathBuf,
}

impl Read {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for Read {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            names::READ,
            "Read file with line numbers (file path, not directory)",
            json_schema_for::<ReadArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<ReadArgs>(arguments);
        Box::pin(async move {
            let args = parsed?;
            let path = resolve_path(&self.workdir, &args.path);
            if fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
                return Err(ToolError::InvalidArguments(format!(
                    "{} is a directory, use ls",
                    args.path
                )));
            }
            let bytes = fs::read(&path)
                .await
                .map_err(|e| ToolError::io("open", &path, e))?;
            let text = String::from_utf8_lossy(&bytes);
            Ok(number_lines(
                &text,
                args.offset.unwrap_or(0),
                args.limit.unwrap_or(0),
            ))
        })
    }
}

/// Number the selected window of `text`. A zero `limit` means the default.
pub fn number_lines(text: &str, offset: usize, limit: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let total = lines.len();
    let start = offset.min(total);
    let limit = if limit == 0 { DEFAULT_READ_LIMIT } else { limit };
    let end = start.saturating_add(limit).min(total);

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate().take(end).skip(start) {
        if line.chars().count() > MAX_LINE_WIDTH {
            out.push_str(&format!("{:4}| {}...\n", i + 1, truncate_chars(line, MAX_LINE_WIDTH)));
        } else {
            out.push_str(&format!("{:4}| {line}\n", i + 1));
        }
    }

    let remaining = total - end;
    if remaining > 0 {
        out.push_str(&format!(
            "\n[... {remaining} more lines. Use offset={end} to continue reading]\n"
        ));
    }
    out
}

// ── Write ───────────────────────────────────────────────────────────

/// Create or overwrite a file. Missing parent directories are created.
pub struct Write {
    workdir: PathBuf,
}

impl Write {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for Write {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            names::WRITE,
            "Write content to file",
            json_schema_for::<WriteArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<WriteArgs>(arguments);
        Box::pin(async move {
            let args = parsed?;
            let path = resolve_path(&self.workdir, &args.path);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ToolError::io("create", parent, e))?;
            }
            fs::write(&path, args.content)
                .await
                .map_err(|e| ToolError::io("write", &path, e))?;
            Ok(OK.to_string())
        })
    }
}

// ── Edit ────────────────────────────────────────────────────────────

/// Find-and-replace inside a file. The match must be unique unless
/// `all=true`.
pub struct Edit {
    workdir: PathBuf,
}

impl Edit {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for Edit {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            names::EDIT,
            "Replace old with new in file (old must be unique unless all=true)",
            json_schema_for::<EditArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<EditArgs>(arguments);
        Box::pin(async move {
            let args = parsed?;
            let path = resolve_path(&self.workdir, &args.path);
            let text = fs::read_to_string(&path)
                .await
                .map_err(|e| ToolError::io("open", &path, e))?;
            let updated = replace_text(&text, &args.old, &args.new, args.all.unwrap_or(false))?;
            fs::write(&path, updated)
                .await
                .map_err(|e| ToolError::io("write", &path, e))?;
            Ok(OK.to_string())
        })
    }
}

/// Apply an edit to `text` without touching the filesystem.
pub fn replace_text(text: &str, old: &str, new: &str, all: bool) -> Result<String, ToolError> {
    if old.is_empty() {
        return Err(ToolError::InvalidArguments("old must not be empty".into()));
    }
    let count = text.matches(old).count();
    if count == 0 {
        return Err(ToolError::EditNotFound);
    }
    if !all && count > 1 {
        return Err(ToolError::EditAmbiguous(count));
    }
    Ok(if all {
        text.replace(old, new)
    } else {
        text.replacen(old, new, 1)
    })
}
