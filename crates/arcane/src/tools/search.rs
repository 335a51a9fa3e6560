//! Search tools: `glob` and `grep`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::ToolDef;
use crate::error::ToolError;
use crate::json_schema_for;
use crate::tools::core::{
    Tool, ToolFuture, display_path, parse_tool_args, resolve_path, truncate_chars,
};
use crate::tools::names;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use walkdir::WalkDir;

// ── Limits ──────────────────────────────────────────────────────────

/// Total hits before `grep` stops walking.
pub const MAX_GREP_HITS: usize = 30;

/// Hits kept per file.
pub const MAX_HITS_PER_FILE: usize = 5;

/// Matching lines longer than this are cut and suffixed with `...`.
pub const MAX_GREP_LINE_LEN: usize = 120;

/// Directories `grep` never descends into.
pub const SKIP_DIRS: [&str; 4] = ["node_modules", ".git", "vendor", "__pycache__"];

/// Sentinel for "no matches".
pub const NONE: &str = "none";

pub const RESULTS_LIMITED: &str =
    "\n[Results limited. Use a more specific pattern or path to narrow search]";

// ── Typed argument structs ──────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct GlobArgs {
    /// Glob pattern, e.g. `**/*.rs`.
    pub pat: String,
    /// Directory to search from (defaults to the working directory).
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
pub struct GrepArgs {
    /// Regular expression.
    pub pat: String,
    /// Directory or file to search (defaults to the working directory).
    #[serde(default)]
    pub path: Option<String>,
}

// ── Glob ────────────────────────────────────────────────────────────

/// Find files by pattern, newest first.
pub struct Glob {
    workdir: PathBuf,
}

impl Glob {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for Glob {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            names::GLOB,
            "Find files by pattern, sorted by mtime",
            json_schema_for::<GlobArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<GlobArgs>(arguments);
        Box::pin(async move {
            let args = parsed?;
            let root = resolve_path(&self.workdir, args.path.as_deref().unwrap_or("."));
            let workdir = self.workdir.clone();
            tokio::task::spawn_blocking(move || glob_files(&workdir, &root, &args.pat))
                .await
                .map_err(|e| ToolError::Command(format!("glob task failed: {e}")))?
        })
    }
}

/// Match `pattern` under `root` and render the hits newest first.
pub fn glob_files(workdir: &Path, root: &Path, pattern: &str) -> Result<String, ToolError> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        pattern.trim_start_matches("./")
    );
    let paths = glob::glob(&full).map_err(|e| ToolError::Pattern(e.to_string()))?;

    let mut hits: Vec<(PathBuf, SystemTime)> = paths
        .filter_map(Result::ok)
        .map(|p| {
            let mtime = std::fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (p, mtime)
        })
        .collect();

    if hits.is_empty() {
        return Ok(NONE.to_string());
    }

    hits.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(hits
        .iter()
        .map(|(p, _)| display_path(workdir, p))
        .collect::<Vec<_>>()
        .join("\n"))
}

// ── Grep ────────────────────────────────────────────────────────────

/// Regex search over a subtree with hit caps.
pub struct Grep {
    workdir: PathBuf,
}

impl Grep {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for Grep {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            names::GREP,
            "Search files for regex pattern",
            json_schema_for::<GrepArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<GrepArgs>(arguments);
        Box::pin(async move {
            let args = parsed?;
            let re = Regex::new(&args.pat).map_err(|e| ToolError::Pattern(e.to_string()))?;
            let root = resolve_path(&self.workdir, args.path.as_deref().unwrap_or("."));
            let workdir = self.workdir.clone();
            tokio::task::spawn_blocking(move || grep_tree(&workdir, &root, &re))
                .await
                .map_err(|e| ToolError::Command(format!("grep task failed: {e}")))
        })
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && SKIP_DIRS.iter().any(|d| entry.file_name() == *d)
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|b| *b == 0)
}

/// Walk `root` in name order and collect `path:line:text` hits.
pub fn grep_tree(workdir: &Path, root: &Path, re: &Regex) -> String {
    let mut hits: Vec<String> = Vec::new();
    let mut limited = false;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file());

    'files: for entry in walker {
        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        if looks_binary(&bytes) {
            continue;
        }
        let text = String::from_utf8_lossy(&bytes);
        let shown = display_path(workdir, entry.path());

        let mut file_hits = 0;
        for (i, line) in text.split('\n').enumerate() {
            if !re.is_match(line) {
                continue;
            }
            let line = line.trim();
            let line = if line.chars().count() > MAX_GREP_LINE_LEN {
                format!("{}...", truncate_chars(line, MAX_GREP_LINE_LEN))
            } else {
                line.to_string()
            };
            hits.push(format!("{shown}:{}:{line}", i + 1));
            file_hits += 1;
            if hits.len() >= MAX_GREP_HITS {
                limited = true;
                break 'files;
            }
            if file_hits >= MAX_HITS_PER_FILE {
                limited = true;
                break;
            }
        }
    }

    if hits.is_empty() {
        return NONE.to_string();
    }
    let mut out = hits.join("\n");
    if limited {
        out.push_str(RESULTS_LIMITED);
    }
    out
}
