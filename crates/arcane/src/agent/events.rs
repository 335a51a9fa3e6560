//! Events, handlers, and turn results for the
//! [`Orchestrator`](super::orchestrator::Orchestrator).
//!
//! The orchestrator reports progress through [`TurnEvent`]s. Callers
//! implement [`EventHandler`] to observe them. Handlers run inline on the
//! orchestrator's task, so they must not block; UIs on another task should
//! use [`ChannelHandler`], which forwards owned [`Notification`]s over a
//! bounded channel and drops them when the channel is full.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget turns |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures |
//! | [`ChannelHandler`] | Non-blocking delivery to a UI task |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use std::sync::atomic::{AtomicU64, Ordering};

use crate::Message;
use crate::context::ContextUsage;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the orchestrator during a turn.
#[derive(Debug)]
pub enum TurnEvent<'a> {
    /// A completion call is about to be made.
    IterationStart {
        iteration: u32,
        max_iterations: u32,
        context_usage: &'a ContextUsage,
    },
    /// Old tool results were truncated before the call.
    Compacted {
        truncated: usize,
        tokens_before: usize,
    },
    /// The model returned text (possibly discarded if it came with tool calls).
    Text(&'a str),
    /// Tool calls were accepted this iteration.
    ToolCallsReceived { iteration: u32, count: usize },
    /// A requested call was rejected before reaching the sandbox.
    ToolCallRejected { name: &'a str, reason: &'a str },
    /// A tool is about to run.
    ToolStarted {
        name: &'a str,
        call_id: &'a str,
        arguments: &'a str,
    },
    /// A tool finished; `summary` is the one-line display string.
    ToolFinished {
        name: &'a str,
        call_id: &'a str,
        result: &'a str,
        summary: &'a str,
    },
    /// Token usage reported for one completion call.
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// The iteration ceiling stopped the loop.
    IterationLimitReached { max_iterations: u32 },
    /// The turn produced its final answer.
    Finished,
}

/// Observer for turn events. The default ignores everything.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &TurnEvent<'_>) {
        let _ = event;
    }
}

/// Ignores all events.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let TurnEvent::ToolFinished { summary, .. } = event {
///         println!("→ {summary}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&TurnEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&TurnEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&TurnEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &TurnEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches each event to every inner handler, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_opt(ui_channel);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &TurnEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &TurnEvent<'_>) {
        match event {
            TurnEvent::IterationStart {
                iteration,
                max_iterations,
                context_usage,
            } => {
                info!(
                    "[iteration {}/{}] {}",
                    iteration,
                    max_iterations,
                    context_usage.to_log_string()
                );
            }
            TurnEvent::Compacted {
                truncated,
                tokens_before,
            } => {
                info!("Compacted {truncated} tool result(s) (was ~{tokens_before} tokens)");
            }
            TurnEvent::Text(text) => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "LLM text: {preview}{}",
                    if text.chars().count() > 200 { "..." } else { "" }
                );
            }
            TurnEvent::ToolCallsReceived { iteration, count } => {
                debug!("{count} tool call(s) in iteration {iteration}");
            }
            TurnEvent::ToolCallRejected { name, reason } => {
                warn!("Rejected tool call {name}: {reason}");
            }
            TurnEvent::ToolStarted { name, call_id, .. } => {
                debug!("Executing tool: {name} ({call_id})");
            }
            TurnEvent::ToolFinished { summary, result, .. } => {
                debug!("{summary} ({} bytes)", result.len());
            }
            TurnEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                debug!("Tokens: prompt={prompt_tokens}, completion={completion_tokens}");
            }
            TurnEvent::IterationLimitReached { max_iterations } => {
                warn!("Agent hit iteration limit ({max_iterations})");
            }
            TurnEvent::Finished => {
                info!("Turn finished");
            }
        }
    }
}

// ── Channel delivery ───────────────────────────────────────────────

/// Owned progress notification for a UI task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ToolStarted { name: String, arguments: String },
    ToolFinished { name: String, summary: String },
    Usage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    Compacted { truncated: usize },
    IterationLimit { max_iterations: u32 },
}

impl Notification {
    fn from_event(event: &TurnEvent<'_>) -> Option<Self> {
        Some(match event {
            TurnEvent::ToolStarted {
                name, arguments, ..
            } => Notification::ToolStarted {
                name: (*name).to_string(),
                arguments: (*arguments).to_string(),
            },
            TurnEvent::ToolFinished { name, summary, .. } => Notification::ToolFinished {
                name: (*name).to_string(),
                summary: (*summary).to_string(),
            },
            TurnEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => Notification::Usage {
                prompt_tokens: *prompt_tokens,
                completion_tokens: *completion_tokens,
            },
            TurnEvent::Compacted { truncated, .. } => Notification::Compacted {
                truncated: *truncated,
            },
            TurnEvent::IterationLimitReached { max_iterations } => Notification::IterationLimit {
                max_iterations: *max_iterations,
            },
            _ => return None,
        })
    }
}

/// Forwards notifications over a bounded channel without ever blocking.
/// When the receiver lags and the channel is full, notifications are
/// dropped and counted.
pub struct ChannelHandler {
    tx: mpsc::Sender<Notification>,
    dropped: AtomicU64,
}

impl ChannelHandler {
    /// Create a handler and its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self {
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Notifications dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventHandler for ChannelHandler {
    fn on_event(&self, event: &TurnEvent<'_>) {
        let Some(notification) = Notification::from_event(event) else {
            return;
        };
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("notification channel full, dropped {n:?}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

// ── Turn result ────────────────────────────────────────────────────

/// One tool call made during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionRecord {
    pub name: String,
    pub arguments: String,
    pub result: String,
    /// Position within the turn, starting at 1.
    pub ordinal: usize,
}

/// The result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final answer shown to the user.
    pub text: String,
    /// Prior history plus this turn's messages, without the system prompt.
    pub history: Vec<Message>,
    /// Prompt tokens summed over every completion call in the turn.
    pub prompt_tokens: u32,
    /// Completion tokens summed over every completion call in the turn.
    pub completion_tokens: u32,
    pub executions: Vec<ToolExecutionRecord>,
    /// Completion calls made.
    pub iterations: u32,
    /// Whether the iteration ceiling ended the turn.
    pub hit_iteration_limit: bool,
    /// Estimated context size of the last request.
    pub context_tokens: usize,
}

impl TurnOutcome {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}
