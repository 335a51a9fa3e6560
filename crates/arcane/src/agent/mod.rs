//! Agent runtime: the turn [`Orchestrator`] and its supporting pieces.
//!
//! - [`orchestrator`]: the `Calling → Interpreting → Executing/Finalizing`
//!   state machine. Start here.
//! - [`interpret`]: structured and inline tool-call recognition.
//! - [`coercion`]: final-answer recovery from the turn's `ls` results.
//! - [`events`]: [`EventHandler`] trait, [`TurnEvent`], handlers and the
//!   bounded notification channel.
//! - [`config`]: [`TurnConfig`] and [`Mode`].
//! - [`prompt`]: system prompts for both modes.
//! - [`models`]: the model catalog.

pub mod coercion;
pub mod config;
pub mod events;
pub mod interpret;
pub mod models;
pub mod orchestrator;
pub mod prompt;

pub use config::{MAX_ITERATIONS, Mode, TurnConfig};
pub use events::{
    ChannelHandler, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler,
    NoopHandler, Notification, ToolExecutionRecord, TurnEvent, TurnOutcome,
};
pub use orchestrator::Orchestrator;
