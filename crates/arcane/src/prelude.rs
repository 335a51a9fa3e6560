//! Convenience re-exports for common `arcane` types.
//!
//! ```ignore
//! use arcane::prelude::*;
//! ```

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    ChatRequest, CompletionClient, DEFAULT_MODEL, Message, MessageRole, OpenRouterClient, ToolDef,
    json_schema_for,
};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    ChannelHandler, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, Mode,
    NoopHandler, Notification, Orchestrator, TurnConfig, TurnEvent, TurnOutcome,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{CompactionPolicy, ContextUsage};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{Tool, ToolFuture, ToolSet, parse_tool_args};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{ToolError, TurnError};
