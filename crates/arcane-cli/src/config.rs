//! Command-line arguments and session configuration.
//!
//! [`Cli`] is the clap surface. [`CliConfig`] is the plain settings value it
//! resolves to, and converts into arcane types via
//! [`build_turn_config`](CliConfig::build_turn_config) and
//! [`build_tool_set`](CliConfig::build_tool_set).

use std::path::PathBuf;

use arcane::DEFAULT_MODEL;
use arcane::agent::models::context_budget_for;
use arcane::agent::{MAX_ITERATIONS, Mode, TurnConfig};
use arcane::tools::ToolSet;
use clap::Parser;

/// Directory under the working directory holding Arcane's files.
pub const STATE_DIR: &str = ".arcane";
const LOG_FILE: &str = "arcane.log";

/// Terminal LLM client with chat and agent modes.
#[derive(Parser, Debug)]
#[command(name = "arcane", version)]
pub struct Cli {
    /// Send one prompt, print the answer and exit.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Start in agent mode (tools enabled).
    #[arg(short, long)]
    pub agent: bool,

    /// Model id.
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Working directory for the tools.
    #[arg(short = 'C', long, default_value = ".")]
    pub workdir: PathBuf,

    /// Completion calls allowed per agent turn.
    #[arg(long, default_value_t = MAX_ITERATIONS)]
    pub max_iterations: u32,

    /// Context budget in tokens. Defaults to the model's context length.
    #[arg(long)]
    pub context_tokens: Option<usize>,

    /// Maximum tokens per response.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Log filter used when ARCANE_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file. Defaults to .arcane/arcane.log under the working directory.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Also print log events to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Resolved settings for a session.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub model: String,
    /// Absolute working directory.
    pub workdir: PathBuf,
    pub mode: Mode,
    pub max_iterations: u32,
    /// Explicit budget; `None` uses the model catalog.
    pub context_tokens: Option<usize>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            workdir: PathBuf::from("."),
            mode: Mode::Chat,
            max_iterations: MAX_ITERATIONS,
            context_tokens: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

impl CliConfig {
    /// Resolve parsed arguments. The working directory is canonicalized
    /// when it exists.
    pub fn from_cli(cli: &Cli) -> Self {
        let workdir = std::fs::canonicalize(&cli.workdir).unwrap_or_else(|_| cli.workdir.clone());
        Self {
            model: cli.model.clone(),
            workdir,
            mode: if cli.agent { Mode::Agent } else { Mode::Chat },
            max_iterations: cli.max_iterations,
            context_tokens: cli.context_tokens,
            max_tokens: cli.max_tokens,
            temperature: cli.temperature,
        }
    }

    /// Token budget for compaction.
    pub fn token_budget(&self) -> usize {
        self.context_tokens
            .filter(|&n| n > 0)
            .unwrap_or_else(|| context_budget_for(&self.model))
    }

    pub fn build_turn_config(&self) -> TurnConfig {
        let mut config = TurnConfig::new(&self.model, &self.workdir)
            .with_max_iterations(self.max_iterations)
            .with_token_budget(self.token_budget());
        config.max_tokens = self.max_tokens;
        config.temperature = self.temperature;
        config
    }

    /// The seven sandbox tools rooted at the working directory.
    pub fn build_tool_set(&self) -> ToolSet {
        ToolSet::new().with_sandbox_tools(&self.workdir)
    }
}

/// Log file location for `cli`.
pub fn log_file_path(cli: &Cli, workdir: &std::path::Path) -> PathBuf {
    cli.log_file
        .clone()
        .unwrap_or_else(|| workdir.join(STATE_DIR).join(LOG_FILE))
}
