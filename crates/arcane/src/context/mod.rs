//! Context window management.
//!
//! 1. **[`compactor`]**: token estimate (serialized chars / 4) and
//!    compaction of old tool results once the estimate exceeds the budget.
//!    The first message and a trailing window are always kept verbatim.
//!
//! 2. **[`budget`]**: [`ContextUsage`] snapshots for logs and turn results.
//!
//! 3. **[`attachments`]**: `@file` mentions expanded into the user message.

pub mod attachments;
pub mod budget;
pub mod compactor;

pub use budget::ContextUsage;
pub use compactor::{CompactionPolicy, DEFAULT_CONTEXT_TOKENS, compact, estimate_tokens};
