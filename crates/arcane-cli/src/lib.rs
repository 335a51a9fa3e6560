//! Terminal front end for the arcane orchestration core.
//!
//! The `arcane` binary is a line-oriented REPL (or a one-shot run with
//! `--prompt`) in chat or agent mode. This library holds the pieces the
//! binary wires together:
//!
//! - [`config`]: clap arguments and [`CliConfig`].
//! - [`session`]: history, mode, model and token totals for a session.
//! - [`commands`]: `/agent`, `/model <id>` and other REPL commands.
//! - [`logging`]: file log layer and filter setup.
//!
//! ```sh
//! # Interactive, agent mode
//! arcane --agent -C /path/to/project
//!
//! # One-shot
//! arcane -p "Summarize @README.md"
//! ```

pub mod commands;
pub mod config;
pub mod logging;
pub mod session;

pub use config::{Cli, CliConfig};
pub use session::Session;
