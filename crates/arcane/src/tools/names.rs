//! Canonical tool name constants.
//!
//! All tool-name string literals reference these constants. The inline
//! fallback and the summary rules match against them.

pub const LS: &str = "ls";
pub const READ: &str = "read";
pub const WRITE: &str = "write";
pub const EDIT: &str = "edit";
pub const GLOB: &str = "glob";
pub const GREP: &str = "grep";
pub const BASH: &str = "bash";

/// Every tool the sandbox provides.
pub const KNOWN_TOOLS: [&str; 7] = [LS, READ, WRITE, EDIT, GLOB, GREP, BASH];

pub fn is_known_tool(name: &str) -> bool {
    KNOWN_TOOLS.contains(&name)
}
