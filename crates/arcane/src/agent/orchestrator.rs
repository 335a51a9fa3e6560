//! The turn state machine.
//!
//! One [`Orchestrator::run_turn`] call owns one turn. Chat mode makes a
//! single completion call. Agent mode cycles through [`TurnState`]:
//!
//! ```text
//! Calling ──> Interpreting ──> Executing ──> Calling ...
//!                  │               │
//!                  └──> Finalizing <┘ (iteration ceiling)
//! ```
//!
//! History is only returned on success, so a failed or cancelled turn
//! leaves the caller's history untouched.

use std::future::Future;

use super::coercion::coerce_final_content;
use super::config::{Mode, TurnConfig};
use super::events::{EventHandler, ToolExecutionRecord, TurnEvent, TurnOutcome};
use super::interpret::{ToolCallRequest, interpret};
use crate::context::{ContextUsage, compact, estimate_tokens};
use crate::error::TurnError;
use crate::tools::{ToolSet, summarize_tool_call};
use crate::{ChatRequest, CompletionChoice, CompletionClient, Message, MessageRole, ToolDef};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// ── State ──────────────────────────────────────────────────────────

/// Agent-mode loop states.
#[derive(Debug)]
enum TurnState {
    /// Compact, then call the model with tools advertised.
    Calling,
    /// Classify the returned choice.
    Interpreting(CompletionChoice),
    /// Run accepted calls in order. `content` is the model text that came
    /// with them, kept for the ceiling notice.
    Executing {
        calls: Vec<ToolCallRequest>,
        content: String,
    },
    /// Coerce the final text and build the outcome.
    Finalizing { content: String, hit_limit: bool },
}

/// Mutable state of one turn.
struct Turn {
    messages: Vec<Message>,
    executions: Vec<ToolExecutionRecord>,
    prompt_tokens: u32,
    completion_tokens: u32,
    iterations: u32,
}

impl Turn {
    fn into_outcome(self, text: String, hit_limit: bool, chars_per_token: usize) -> TurnOutcome {
        let history: Vec<Message> = self
            .messages
            .into_iter()
            .filter(|m| m.role != MessageRole::System)
            .collect();
        let context_tokens = estimate_tokens(&history, chars_per_token);
        TurnOutcome {
            text,
            history,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            executions: self.executions,
            iterations: self.iterations,
            hit_iteration_limit: hit_limit,
            context_tokens,
        }
    }
}

// ── Orchestrator ───────────────────────────────────────────────────

/// Runs turns against a completion client and a tool set.
///
/// ```ignore
/// let handler = CompositeEventHandler::new().with(LoggingHandler);
/// let outcome = Orchestrator::new(&client, &tools, config)
///     .with_event_handler(&handler)
///     .with_cancellation(token.clone())
///     .run_turn(&history, "list files", Mode::Agent)
///     .await?;
/// history = outcome.history;
/// ```
pub struct Orchestrator<'a> {
    client: &'a dyn CompletionClient,
    tools: &'a ToolSet,
    config: TurnConfig,
    event_handler: &'a dyn EventHandler,
    cancel: Option<CancellationToken>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(client: &'a dyn CompletionClient, tools: &'a ToolSet, config: TurnConfig) -> Self {
        Self {
            client,
            tools,
            config,
            event_handler: &super::events::NoopHandler,
            cancel: None,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Cancel the turn when `token` fires. Checked before every completion
    /// call and every tool, and raced against both while in flight.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Run one turn: `history` plus `user_message`, in `mode`.
    ///
    /// On success the outcome's history is `history` plus this turn's
    /// messages, without the system prompt.
    pub async fn run_turn(
        &self,
        history: &[Message],
        user_message: &str,
        mode: Mode,
    ) -> Result<TurnOutcome, TurnError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.config.system_prompt(mode)));
        messages.extend(
            history
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .cloned(),
        );
        messages.push(Message::user(user_message));

        let turn = Turn {
            messages,
            executions: Vec::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            iterations: 0,
        };

        info!(
            "Starting {} turn: model={}, history={} messages",
            mode.label(),
            self.config.model,
            history.len()
        );

        match mode {
            Mode::Chat => self.run_chat(turn).await,
            Mode::Agent => self.run_agent(turn).await,
        }
    }

    async fn run_chat(&self, mut turn: Turn) -> Result<TurnOutcome, TurnError> {
        turn.iterations = 1;
        let choice = self.call(&mut turn, None).await?;
        let text = choice.content.unwrap_or_default();
        if !text.is_empty() {
            self.event_handler.on_event(&TurnEvent::Text(&text));
        }
        turn.messages.push(Message::assistant_text(text.clone()));
        self.event_handler.on_event(&TurnEvent::Finished);
        Ok(turn.into_outcome(text, false, self.config.compaction.chars_per_token))
    }

    async fn run_agent(&self, mut turn: Turn) -> Result<TurnOutcome, TurnError> {
        let definitions = self.tools.definitions();
        let max_iterations = self.config.max_iterations.max(1);
        let mut state = TurnState::Calling;

        loop {
            state = match state {
                TurnState::Calling => {
                    turn.iterations += 1;
                    self.compact(&mut turn);
                    let usage = ContextUsage::measure(&turn.messages, &self.config.compaction);
                    self.event_handler.on_event(&TurnEvent::IterationStart {
                        iteration: turn.iterations,
                        max_iterations,
                        context_usage: &usage,
                    });
                    let tools = (!definitions.is_empty()).then(|| definitions.clone());
                    TurnState::Interpreting(self.call(&mut turn, tools).await?)
                }

                TurnState::Interpreting(choice) => {
                    let interpretation = interpret(&choice, &format!("inline-{}", turn.iterations));
                    for rejected in &interpretation.rejected {
                        self.event_handler.on_event(&TurnEvent::ToolCallRejected {
                            name: &rejected.name,
                            reason: &rejected.reason,
                        });
                    }

                    let content = choice.content.unwrap_or_default();
                    if !content.is_empty() {
                        self.event_handler.on_event(&TurnEvent::Text(&content));
                    }

                    if interpretation.has_calls() {
                        if interpretation.is_inline() {
                            debug!("Inline tool call in iteration {}", turn.iterations);
                        }
                        self.event_handler.on_event(&TurnEvent::ToolCallsReceived {
                            iteration: turn.iterations,
                            count: interpretation.calls.len(),
                        });
                        let calls = interpretation
                            .calls
                            .iter()
                            .map(ToolCallRequest::to_tool_call)
                            .collect();
                        turn.messages.push(Message::assistant_tool_calls(calls));
                        TurnState::Executing {
                            calls: interpretation.calls,
                            content,
                        }
                    } else {
                        turn.messages.push(Message::assistant_text(content.clone()));
                        TurnState::Finalizing {
                            content,
                            hit_limit: false,
                        }
                    }
                }

                TurnState::Executing { calls, content } => {
                    for call in &calls {
                        self.execute(&mut turn, call).await?;
                    }
                    if turn.iterations >= max_iterations {
                        self.event_handler
                            .on_event(&TurnEvent::IterationLimitReached { max_iterations });
                        TurnState::Finalizing {
                            content: format!(
                                "{content}\n\n*[Stopped after {max_iterations} tool iterations]*"
                            ),
                            hit_limit: true,
                        }
                    } else {
                        TurnState::Calling
                    }
                }

                TurnState::Finalizing { content, hit_limit } => {
                    let text = coerce_final_content(&content, &turn.executions);
                    if text != content {
                        debug!("Final answer replaced by the last ls listing");
                    }
                    // The last message is the final assistant text unless the
                    // ceiling stopped the loop right after tool results.
                    match turn.messages.last_mut() {
                        Some(last) if !hit_limit && last.role == MessageRole::Assistant => {
                            last.content = Some(text.clone());
                        }
                        _ => turn.messages.push(Message::assistant_text(text.clone())),
                    }
                    self.event_handler.on_event(&TurnEvent::Finished);
                    return Ok(turn.into_outcome(
                        text,
                        hit_limit,
                        self.config.compaction.chars_per_token,
                    ));
                }
            };
        }
    }

    // ── Steps ──────────────────────────────────────────────────────

    fn compact(&self, turn: &mut Turn) {
        let compaction = compact(&turn.messages, &self.config.compaction);
        if compaction.changed() {
            self.event_handler.on_event(&TurnEvent::Compacted {
                truncated: compaction.truncated,
                tokens_before: compaction.tokens_before,
            });
            turn.messages = compaction.messages;
        }
    }

    /// One completion call. Usage is accumulated before the choice is
    /// checked, so a zero-choice response still counts.
    async fn call(
        &self,
        turn: &mut Turn,
        tools: Option<Vec<ToolDef>>,
    ) -> Result<CompletionChoice, TurnError> {
        self.check_cancelled()?;

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: turn.messages.clone(),
            max_tokens: self.config.max_tokens.unwrap_or(0),
            temperature: self.config.temperature,
            tools,
        };

        let completion = self
            .cancellable(self.client.chat(&request))
            .await?
            .map_err(TurnError::Transport)?;

        if let Some(usage) = &completion.usage {
            let prompt_tokens = usage.prompt_tokens.unwrap_or(0);
            let completion_tokens = usage.completion_tokens.unwrap_or(0);
            turn.prompt_tokens += prompt_tokens;
            turn.completion_tokens += completion_tokens;
            self.event_handler.on_event(&TurnEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            });
        }

        completion
            .choices
            .into_iter()
            .next()
            .ok_or(TurnError::EmptyResponse)
    }

    /// Run one accepted call and record its result.
    async fn execute(&self, turn: &mut Turn, call: &ToolCallRequest) -> Result<(), TurnError> {
        self.check_cancelled()?;

        self.event_handler.on_event(&TurnEvent::ToolStarted {
            name: &call.name,
            call_id: &call.id,
            arguments: &call.arguments,
        });

        let result = self
            .cancellable(self.tools.execute(&call.name, &call.arguments))
            .await?;

        turn.messages.push(Message::tool_result(&call.id, &result));
        turn.executions.push(ToolExecutionRecord {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result: result.clone(),
            ordinal: turn.executions.len() + 1,
        });

        let summary = summarize_tool_call(&call.name, &call.arguments, &result);
        self.event_handler.on_event(&TurnEvent::ToolFinished {
            name: &call.name,
            call_id: &call.id,
            result: &result,
            summary: &summary,
        });
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), TurnError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(TurnError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Await `fut`, or stop with [`TurnError::Cancelled`] if the token fires
    /// first. Dropping `fut` aborts the request or kills the shell child.
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, TurnError> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(TurnError::Cancelled),
                out = fut => Ok(out),
            },
            None => Ok(fut.await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::{ChannelHandler, Notification};
    use crate::{ChatCompletion, ChatFuture, ToolCall, UsageInfo};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replays scripted responses; once exhausted, repeats `fallback`.
    struct ScriptedClient {
        script: Mutex<VecDeque<Result<ChatCompletion, String>>>,
        fallback: Option<ChatCompletion>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<ChatCompletion, String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn repeating(completion: ChatCompletion) -> Self {
            Self {
                fallback: Some(completion),
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, i: usize) -> ChatRequest {
            self.requests.lock().unwrap()[i].clone()
        }
    }

    impl CompletionClient for ScriptedClient {
        fn chat<'a>(&'a self, body: &'a ChatRequest) -> ChatFuture<'a> {
            self.requests.lock().unwrap().push(body.clone());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .or_else(|| self.fallback.clone().map(Ok))
                .unwrap_or_else(|| Err("script exhausted".into()));
            Box::pin(async move { next })
        }
    }

    fn respond(choice: CompletionChoice, prompt: u32, completion: u32) -> Result<ChatCompletion, String> {
        Ok(ChatCompletion {
            choices: vec![choice],
            usage: Some(UsageInfo {
                prompt_tokens: Some(prompt),
                completion_tokens: Some(completion),
                total_tokens: Some(prompt + completion),
            }),
        })
    }

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        dir
    }

    #[tokio::test]
    async fn chat_mode_single_call_without_tools() {
        let client = ScriptedClient::new(vec![respond(CompletionChoice::text("Hi there"), 10, 3)]);
        let tools = ToolSet::new().with_sandbox_tools(".");
        let prior = vec![Message::user("earlier"), Message::assistant_text("ok")];

        let outcome = Orchestrator::new(&client, &tools, TurnConfig::new("m", "."))
            .run_turn(&prior, "hello", Mode::Chat)
            .await
            .unwrap();

        assert_eq!(client.calls(), 1);
        let request = client.request(0);
        assert!(request.tools.is_none());
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages.len(), 4);
        assert_eq!(outcome.text, "Hi there");
        assert_eq!(
            outcome.history,
            vec![
                Message::user("earlier"),
                Message::assistant_text("ok"),
                Message::user("hello"),
                Message::assistant_text("Hi there"),
            ]
        );
        assert_eq!((outcome.prompt_tokens, outcome.completion_tokens), (10, 3));
    }

    #[tokio::test]
    async fn chat_mode_ignores_inline_calls() {
        let client = ScriptedClient::new(vec![respond(CompletionChoice::text("ls{}"), 1, 1)]);
        let tools = ToolSet::new().with_sandbox_tools(".");
        let outcome = Orchestrator::new(&client, &tools, TurnConfig::new("m", "."))
            .run_turn(&[], "hi", Mode::Chat)
            .await
            .unwrap();
        assert_eq!(outcome.text, "ls{}");
        assert!(outcome.executions.is_empty());
    }

    #[tokio::test]
    async fn zero_choices_is_an_error() {
        let client = ScriptedClient::new(vec![Ok(ChatCompletion::default())]);
        let tools = ToolSet::new();
        for mode in [Mode::Chat, Mode::Agent] {
            let err = Orchestrator::new(&client, &tools, TurnConfig::new("m", "."))
                .run_turn(&[], "hi", mode)
                .await
                .unwrap_err();
            assert!(matches!(err, TurnError::EmptyResponse | TurnError::Transport(_)));
        }
        let client = ScriptedClient::new(vec![Ok(ChatCompletion::default())]);
        let err = Orchestrator::new(&client, &tools, TurnConfig::new("m", "."))
            .run_turn(&[], "hi", Mode::Agent)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "empty response from model");
    }

    #[tokio::test]
    async fn transport_error_surfaces_verbatim() {
        let client = ScriptedClient::new(vec![Err("OpenRouter API HTTP 500: boom".into())]);
        let tools = ToolSet::new().with_sandbox_tools(".");
        let err = Orchestrator::new(&client, &tools, TurnConfig::new("m", "."))
            .run_turn(&[], "hi", Mode::Agent)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "OpenRouter API HTTP 500: boom");
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn list_files_end_to_end() {
        let dir = workspace();
        let mut ls = CompletionChoice::tool_calls(vec![ToolCall::new("call_1", "ls", "{}")]);
        ls.content = Some("Let me check... the directory is empty.".into());
        let client = ScriptedClient::new(vec![
            respond(ls, 100, 10),
            respond(CompletionChoice::text(""), 150, 1),
        ]);
        let tools = ToolSet::new().with_sandbox_tools(dir.path());
        let (channel, mut rx) = ChannelHandler::channel(16);

        let outcome = Orchestrator::new(&client, &tools, TurnConfig::new("m", dir.path()))
            .with_event_handler(&channel)
            .run_turn(&[], "list files", Mode::Agent)
            .await
            .unwrap();

        let listing = "Entries in the current directory:\n- a.txt\n- sub/";
        assert_eq!(outcome.text, listing);
        assert_eq!(outcome.history.len(), 4);
        assert_eq!(outcome.history[0], Message::user("list files"));
        assert_eq!(
            outcome.history[1],
            Message::assistant_tool_calls(vec![ToolCall::new("call_1", "ls", "{}")])
        );
        assert_eq!(outcome.history[2].role, MessageRole::Tool);
        assert_eq!(outcome.history[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(outcome.history[2].text(), "[FILE] a.txt\n[DIR]  sub/\n");
        assert_eq!(outcome.history[3], Message::assistant_text(listing));
        assert!(outcome.history.iter().all(|m| m.role != MessageRole::System));
        assert_eq!((outcome.prompt_tokens, outcome.completion_tokens), (250, 11));
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.executions.len(), 1);

        // Tools are advertised and the second request carries the tool result.
        assert_eq!(client.request(0).tools.map(|t| t.len()), Some(7));
        assert_eq!(client.request(1).messages.len(), 4);

        assert_eq!(
            rx.recv().await,
            Some(Notification::Usage {
                prompt_tokens: 100,
                completion_tokens: 10
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(Notification::ToolStarted {
                name: "ls".into(),
                arguments: "{}".into()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(Notification::ToolFinished {
                name: "ls".into(),
                summary: "LS . (2 entries)".into()
            })
        );
    }

    #[tokio::test]
    async fn iteration_ceiling_stops_after_exactly_max_calls() {
        let dir = workspace();
        let looping = CompletionChoice::tool_calls(vec![ToolCall::new(
            "c",
            "read",
            r#"{"path": "a.txt"}"#,
        )]);
        let client = ScriptedClient::repeating(ChatCompletion {
            choices: vec![looping],
            usage: None,
        });
        let tools = ToolSet::new().with_sandbox_tools(dir.path());

        let outcome = Orchestrator::new(&client, &tools, TurnConfig::new("m", dir.path()))
            .run_turn(&[], "loop forever", Mode::Agent)
            .await
            .unwrap();

        assert_eq!(client.calls(), 15);
        assert!(outcome.hit_iteration_limit);
        assert_eq!(outcome.text, "\n\n*[Stopped after 15 tool iterations]*");
        assert_eq!(outcome.executions.len(), 15);
        // user + 15 * (assistant call + tool result) + final assistant
        assert_eq!(outcome.history.len(), 32);
        assert_eq!(outcome.history[31].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn custom_ceiling() {
        let client = ScriptedClient::repeating(ChatCompletion {
            choices: vec![CompletionChoice::text("ls{}")],
            usage: None,
        });
        let dir = workspace();
        let tools = ToolSet::new().with_sandbox_tools(dir.path());
        let config = TurnConfig::new("m", dir.path()).with_max_iterations(3);
        let outcome = Orchestrator::new(&client, &tools, config)
            .run_turn(&[], "go", Mode::Agent)
            .await
            .unwrap();
        assert_eq!(client.calls(), 3);
        assert!(outcome.text.ends_with("*[Stopped after 3 tool iterations]*"));
    }

    #[tokio::test]
    async fn inline_call_becomes_tool_round_trip() {
        let dir = workspace();
        let client = ScriptedClient::new(vec![
            respond(CompletionChoice::text(r#"read{"path": "a.txt"}"#), 1, 1),
            respond(CompletionChoice::text("It says alpha."), 1, 1),
        ]);
        let tools = ToolSet::new().with_sandbox_tools(dir.path());

        let outcome = Orchestrator::new(&client, &tools, TurnConfig::new("m", dir.path()))
            .run_turn(&[], "what is in a.txt", Mode::Agent)
            .await
            .unwrap();

        assert_eq!(outcome.text, "It says alpha.");
        let call = &outcome.history[1];
        assert_eq!(call.content, None);
        let calls = call.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "inline-1");
        assert_eq!(calls[0].function.name, "read");
        assert_eq!(outcome.history[2].tool_call_id.as_deref(), Some("inline-1"));
        assert!(outcome.history[2].text().contains("alpha"));
    }

    #[tokio::test]
    async fn rejected_calls_never_execute() {
        let dir = workspace();
        let mixed = CompletionChoice::tool_calls(vec![
            ToolCall::new("bad", "delete_everything", "{}"),
            ToolCall::new("good", "ls", "{}"),
        ]);
        let client = ScriptedClient::new(vec![
            respond(mixed, 1, 1),
            respond(CompletionChoice::text("Done."), 1, 1),
        ]);
        let tools = ToolSet::new().with_sandbox_tools(dir.path());

        let outcome = Orchestrator::new(&client, &tools, TurnConfig::new("m", dir.path()))
            .run_turn(&[], "go", Mode::Agent)
            .await
            .unwrap();

        assert_eq!(outcome.executions.len(), 1);
        assert_eq!(outcome.executions[0].name, "ls");
        let stored = outcome.history[1].tool_calls.as_ref().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "good");
    }

    #[tokio::test]
    async fn all_rejected_is_final_text() {
        let mut bad = CompletionChoice::tool_calls(vec![ToolCall::new("x", "rm", "{}")]);
        bad.content = Some("Trying rm.".into());
        let client = ScriptedClient::new(vec![respond(bad, 1, 1)]);
        let tools = ToolSet::new().with_sandbox_tools(".");

        let outcome = Orchestrator::new(&client, &tools, TurnConfig::new("m", "."))
            .run_turn(&[], "go", Mode::Agent)
            .await
            .unwrap();

        assert_eq!(client.calls(), 1);
        assert_eq!(outcome.text, "Trying rm.");
        assert!(outcome.executions.is_empty());
        assert_eq!(outcome.history[1], Message::assistant_text("Trying rm."));
    }

    #[tokio::test]
    async fn tool_errors_become_results() {
        let dir = workspace();
        let client = ScriptedClient::new(vec![
            respond(
                CompletionChoice::tool_calls(vec![ToolCall::new("c", "grep", r#"{"pat": "("}"#)]),
                1,
                1,
            ),
            respond(CompletionChoice::text("Bad regex."), 1, 1),
        ]);
        let tools = ToolSet::new().with_sandbox_tools(dir.path());

        let outcome = Orchestrator::new(&client, &tools, TurnConfig::new("m", dir.path()))
            .run_turn(&[], "go", Mode::Agent)
            .await
            .unwrap();

        assert!(outcome.history[2].text().starts_with("error: "));
        assert_eq!(outcome.text, "Bad regex.");
    }

    #[tokio::test]
    async fn cancelled_turn_returns_no_history() {
        let client = ScriptedClient::new(vec![respond(CompletionChoice::text("hi"), 1, 1)]);
        let tools = ToolSet::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = Orchestrator::new(&client, &tools, TurnConfig::new("m", "."))
            .with_cancellation(token)
            .run_turn(&[], "hi", Mode::Agent)
            .await
            .unwrap_err();

        assert!(matches!(err, TurnError::Cancelled));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_running_tool() {
        let dir = workspace();
        let client = ScriptedClient::new(vec![respond(
            CompletionChoice::tool_calls(vec![ToolCall::new("c", "bash", r#"{"cmd": "sleep 20"}"#)]),
            1,
            1,
        )]);
        let tools = ToolSet::new().with_sandbox_tools(dir.path());
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = Orchestrator::new(&client, &tools, TurnConfig::new("m", dir.path()))
            .with_cancellation(token)
            .run_turn(&[], "sleep", Mode::Agent)
            .await
            .unwrap_err();

        assert!(matches!(err, TurnError::Cancelled));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn compaction_runs_before_calls() {
        let dir = workspace();
        let big = "x".repeat(2_000);
        let mut prior = vec![Message::user("start")];
        for i in 0..4 {
            let id = format!("old{i}");
            prior.push(Message::assistant_tool_calls(vec![ToolCall::new(&id, "read", "{}")]));
            prior.push(Message::tool_result(&id, &big));
        }
        let client = ScriptedClient::new(vec![respond(CompletionChoice::text("ok"), 1, 1)]);
        let tools = ToolSet::new().with_sandbox_tools(dir.path());
        let config = TurnConfig::new("m", dir.path()).with_token_budget(100);

        let outcome = Orchestrator::new(&client, &tools, config)
            .run_turn(&prior, "next", Mode::Agent)
            .await
            .unwrap();

        let sent = client.request(0).messages;
        assert_eq!(sent.len(), prior.len() + 2);
        assert!(sent[3].text().starts_with("[1 lines] xxx"));
        assert!(sent[3].text().ends_with("..."));
        // Trailing window stays verbatim.
        assert_eq!(sent[sent.len() - 2].text(), big);
        assert_eq!(outcome.history.len(), prior.len() + 2);
    }
}
