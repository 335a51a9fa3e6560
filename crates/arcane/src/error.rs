//! Error types.
//!
//! [`TurnError`] ends a turn and reaches the caller. [`ToolError`] never
//! does: the tool set renders it as an `error: <detail>` tool result so the
//! model can react to it.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal failure of a single turn. History is left untouched.
#[derive(Debug, Error)]
pub enum TurnError {
    /// Client, HTTP or API error, surfaced verbatim.
    #[error("{0}")]
    Transport(String),
    /// The endpoint answered with zero choices.
    #[error("empty response from model")]
    EmptyResponse,
    /// The caller cancelled the turn.
    #[error("turn cancelled")]
    Cancelled,
}

/// Failure inside a sandbox tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern: {0}")]
    Pattern(String),

    #[error("old_string not found")]
    EditNotFound,

    #[error("old_string appears {0} times, must be unique (use all=true)")]
    EditAmbiguous(usize),

    #[error("{0}")]
    Command(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
