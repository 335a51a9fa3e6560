//! The tool execution sandbox.
//!
//! Seven tools are exposed to the model, each a [`Tool`] implementor with
//! its own size or time limits. They are collected into a [`ToolSet`] which
//! handles dispatch, schema validation and error rendering.
//!
//! - [`core`]: [`Tool`] trait, [`ToolSet`], argument helpers.
//! - [`fs`]: `ls`, `read`, `write`, `edit`.
//! - [`search`]: `glob`, `grep`.
//! - [`shell`]: `bash`.
//! - [`summary`]: one-line UI summaries of finished calls.
//! - [`names`]: canonical tool names.

pub mod core;
pub mod fs;
pub mod names;
pub mod search;
pub mod shell;
pub mod summary;

pub use core::{Tool, ToolFuture, ToolSet, parse_tool_args, validate_tool_arguments};
pub use summary::summarize_tool_call;
