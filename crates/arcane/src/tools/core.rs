//! Tool abstraction for the sandbox.
//!
//! The [`Tool`] trait defines the interface every sandbox tool implements:
//! a static API definition (name, description, JSON schema) and an async
//! `execute` method. Tools are collected into a [`ToolSet`] which handles
//! dispatch, argument validation, definition export, and error rendering.

use crate::ToolDef;
use crate::error::ToolError;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tracing::{debug, info, trace};

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool the model can invoke via function-calling.
///
/// Failures are returned as [`ToolError`]; the [`ToolSet`] turns them into
/// `error: <detail>` text so the model sees them as ordinary results.
pub trait Tool: Send + Sync {
    /// The tool definition sent to the LLM API.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    fn name(&self) -> String {
        self.definition().function.name.clone()
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// A collection of tools dispatched by name.
///
/// Definitions are exported in registration order so the advertised schema
/// is identical across calls.
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with_sandbox_tools("/path/to/workdir")
///     .with_if(allow_shell, Bash::new("/path/to/workdir"));
/// let defs = tools.definitions();
/// ```
pub struct ToolSet {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
    validate_args: bool,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.order)
            .field("validate_args", &self.validate_args)
            .finish()
    }
}

impl ToolSet {
    /// Create an empty tool set. Argument validation is on.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            validate_args: true,
        }
    }

    /// Toggle JSON Schema argument validation before execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, Box::new(tool));
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Register `tool` only when `condition` holds.
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// Register the seven sandbox tools rooted at `workdir`.
    pub fn with_sandbox_tools(self, workdir: impl Into<PathBuf>) -> Self {
        use crate::tools::fs::{Edit, Ls, Read, Write};
        use crate::tools::search::{Glob, Grep};
        use crate::tools::shell::Bash;
        let workdir = workdir.into();
        self.with(Ls::new(workdir.clone()))
            .with(Read::new(workdir.clone()))
            .with(Write::new(workdir.clone()))
            .with(Edit::new(workdir.clone()))
            .with(Glob::new(workdir.clone()))
            .with(Grep::new(workdir.clone()))
            .with(Bash::new(workdir))
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.definition())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call by name.
    ///
    /// Never fails: unknown tools, schema violations and tool errors all come
    /// back as `error: <detail>` text.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        let Some(tool) = self.tools.get(name) else {
            return render_error(&ToolError::UnknownTool(name.to_string()));
        };

        let arguments = normalize_arguments(arguments);

        if self.validate_args
            && let Err(e) = validate_tool_arguments(tool.as_ref(), arguments)
        {
            return render_error(&e);
        }

        log_tool_call(name, arguments);
        let start = std::time::Instant::now();

        let result = match tool.execute(arguments).await {
            Ok(output) => output,
            Err(e) => render_error(&e),
        };

        debug!(
            "Tool {name} completed in {:.0}ms ({} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            result.len()
        );
        trace!("Tool {name} result preview: {}", truncate_chars(&result, 300));

        result
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Text the model sees for a failed tool call.
pub fn render_error(err: &ToolError) -> String {
    format!("error: {err}")
}

/// Models sometimes send an empty string for a no-argument call.
pub fn normalize_arguments(arguments: &str) -> &str {
    if arguments.trim().is_empty() { "{}" } else { arguments }
}

/// Validate tool arguments against the tool's declared JSON Schema.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Result<(), ToolError> {
    let args_value: serde_json::Value = serde_json::from_str(arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("malformed JSON: {e}")))?;

    let schema = tool.definition().function.parameters;
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return Ok(());
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| {
            let path = e.instance_path().to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{path}: {e}")
            }
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(errors.join("; ")))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview = truncate_chars(arguments, 120);
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {arguments}");
}

/// Parse raw JSON arguments into a typed struct.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, ToolError> {
    serde_json::from_str(normalize_arguments(arguments))
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Resolve a tool path argument against the working directory. Absolute
/// paths are used as given; an empty path means the working directory.
pub fn resolve_path(workdir: &Path, path: &str) -> PathBuf {
    let path = path.trim();
    if path.is_empty() || path == "." {
        return workdir.to_path_buf();
    }
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workdir.join(candidate)
    }
}

/// Render `path` relative to `workdir` when it lies inside it.
pub fn display_path(workdir: &Path, path: &Path) -> String {
    path.strip_prefix(workdir)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
