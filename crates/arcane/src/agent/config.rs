//! Configuration for an [`Orchestrator`](super::orchestrator::Orchestrator) turn.
//!
//! [`TurnConfig`] is an explicit value handed to the orchestrator: model id,
//! iteration ceiling, compaction policy and the two system prompts. Nothing
//! is read from ambient process state during a turn.
//!
//! ```ignore
//! let config = TurnConfig::new("google/gemini-3-flash-preview", "/work")
//!     .with_max_iterations(10)
//!     .with_token_budget(128_000)
//!     .with_temperature(0.2);
//! ```

use std::path::Path;

use crate::agent::prompt::{CHAT_SYSTEM_PROMPT, agent_system_prompt};
use crate::context::CompactionPolicy;

/// Tool round-trips allowed in one agent turn.
pub const MAX_ITERATIONS: u32 = 15;

/// How a turn is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// One completion call, no tools advertised.
    #[default]
    Chat,
    /// Tool loop bounded by [`TurnConfig::max_iterations`].
    Agent,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Agent => "agent",
        }
    }
}

/// Settings for running turns.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Model identifier (e.g. `"google/gemini-3-flash-preview"`).
    pub model: String,
    /// Completion calls allowed in agent mode before forcing an answer.
    pub max_iterations: u32,
    /// Compaction applied before every agent-mode call.
    pub compaction: CompactionPolicy,
    pub chat_system_prompt: String,
    pub agent_system_prompt: String,
    /// Maximum tokens per response; `None` leaves it to the provider.
    pub max_tokens: Option<u32>,
    /// Sampling temperature; `None` leaves it to the provider.
    pub temperature: Option<f32>,
}

impl TurnConfig {
    /// Defaults for `model`, with the agent prompt naming `workdir`.
    pub fn new(model: impl Into<String>, workdir: impl AsRef<Path>) -> Self {
        Self {
            model: model.into(),
            max_iterations: MAX_ITERATIONS,
            compaction: CompactionPolicy::agent(),
            chat_system_prompt: CHAT_SYSTEM_PROMPT.to_string(),
            agent_system_prompt: agent_system_prompt(workdir.as_ref()),
            max_tokens: None,
            temperature: None,
        }
    }

    // ── Builder methods ───────────────────────────────────────────

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the iteration ceiling. Zero is raised to one.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_compaction(mut self, compaction: CompactionPolicy) -> Self {
        self.compaction = compaction;
        self
    }

    /// Set the compaction token budget, keeping the rest of the policy.
    pub fn with_token_budget(mut self, token_budget: usize) -> Self {
        self.compaction = self.compaction.with_token_budget(token_budget);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_agent_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.agent_system_prompt = prompt.into();
        self
    }

    pub fn with_chat_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.chat_system_prompt = prompt.into();
        self
    }

    /// The system prompt used for `mode`.
    pub fn system_prompt(&self, mode: Mode) -> &str {
        match mode {
            Mode::Chat => &self.chat_system_prompt,
            Mode::Agent => &self.agent_system_prompt,
        }
    }
}
