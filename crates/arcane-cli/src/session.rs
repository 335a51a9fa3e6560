//! An interactive session: history, mode, model and running token totals.
//!
//! The session owns its history exclusively. A turn's history replaces it
//! only when the turn succeeds.

use arcane::CompletionClient;
use arcane::Message;
use arcane::agent::models::{AVAILABLE_MODELS, find_model};
use arcane::agent::{EventHandler, Mode, Orchestrator, TurnOutcome};
use arcane::context::attachments::expand_mentions;
use arcane::error::TurnError;
use arcane::tools::ToolSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::CliConfig;

pub struct Session {
    pub config: CliConfig,
    pub history: Vec<Message>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Estimated size of the stored history after the last turn.
    pub context_tokens: usize,
}

impl Session {
    pub fn new(config: CliConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            context_tokens: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.config.mode = mode;
    }

    /// Switch models. Ids outside the catalog are accepted with a note.
    pub fn set_model(&mut self, id: &str) -> String {
        self.config.model = id.to_string();
        match find_model(id) {
            Some(model) => format!("Model: {} ({})", model.name, model.provider),
            None => format!("Model: {id} (not in catalog, using default context budget)"),
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.prompt_tokens = 0;
        self.completion_tokens = 0;
        self.context_tokens = 0;
    }

    /// Run one turn. `@file` mentions in `input` are expanded first.
    pub async fn send(
        &mut self,
        client: &dyn CompletionClient,
        tools: &ToolSet,
        handler: &dyn EventHandler,
        cancel: CancellationToken,
        input: &str,
    ) -> Result<String, TurnError> {
        let message = expand_mentions(input, &self.config.workdir);
        let outcome = Orchestrator::new(client, tools, self.config.build_turn_config())
            .with_event_handler(handler)
            .with_cancellation(cancel)
            .run_turn(&self.history, &message, self.config.mode)
            .await?;
        Ok(self.apply(outcome))
    }

    fn apply(&mut self, outcome: TurnOutcome) -> String {
        info!(
            "Turn done: iterations={}, tools={}, tokens={}",
            outcome.iterations,
            outcome.executions.len(),
            outcome.total_tokens()
        );
        self.history = outcome.history;
        self.prompt_tokens += u64::from(outcome.prompt_tokens);
        self.completion_tokens += u64::from(outcome.completion_tokens);
        self.context_tokens = outcome.context_tokens;
        outcome.text
    }

    pub fn usage_line(&self) -> String {
        format!(
            "[{} | {} | in {} / out {} | context ~{}/{} tokens]",
            self.config.mode.label(),
            self.config.model,
            self.prompt_tokens,
            self.completion_tokens,
            self.context_tokens,
            self.config.token_budget()
        )
    }
}

/// The catalog as display lines, marking `current`.
pub fn model_list(current: &str) -> String {
    AVAILABLE_MODELS
        .iter()
        .map(|m| {
            let marker = if m.id == current { "*" } else { " " };
            format!("{marker} {:<32} {} - {}", m.id, m.name, m.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcane::agent::NoopHandler;
    use arcane::{ChatCompletion, ChatFuture, ChatRequest, CompletionChoice, ToolCall};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Scripted {
        script: Mutex<VecDeque<Result<ChatCompletion, String>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(choices: Vec<Result<CompletionChoice, String>>) -> Self {
            let script = choices
                .into_iter()
                .map(|c| {
                    c.map(|choice| ChatCompletion {
                        choices: vec![choice],
                        usage: None,
                    })
                })
                .collect();
            Self {
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionClient for Scripted {
        fn chat<'a>(&'a self, body: &'a ChatRequest) -> ChatFuture<'a> {
            self.requests.lock().unwrap().push(body.clone());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".into()));
            Box::pin(async move { next })
        }
    }

    fn session(dir: &TempDir, mode: Mode) -> Session {
        Session::new(CliConfig {
            workdir: dir.path().to_path_buf(),
            mode,
            ..CliConfig::default()
        })
    }

    #[tokio::test]
    async fn successful_turn_extends_history() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir, Mode::Chat);
        let tools = s.config.build_tool_set();
        let client = Scripted::new(vec![Ok(CompletionChoice::text("Hello!"))]);

        let text = s
            .send(&client, &tools, &NoopHandler, CancellationToken::new(), "hi")
            .await
            .unwrap();

        assert_eq!(text, "Hello!");
        assert_eq!(s.history.len(), 2);
    }

    #[tokio::test]
    async fn failed_turn_keeps_history() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir, Mode::Agent);
        s.history = vec![Message::user("old"), Message::assistant_text("reply")];
        let tools = s.config.build_tool_set();
        let client = Scripted::new(vec![
            Ok(CompletionChoice::tool_calls(vec![ToolCall::new("c", "ls", "{}")])),
            Err("connection reset".into()),
        ]);

        let err = s
            .send(&client, &tools, &NoopHandler, CancellationToken::new(), "list")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(s.history.len(), 2);
    }

    #[tokio::test]
    async fn mentions_are_attached() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.md"), "remember the milk").unwrap();
        let mut s = session(&dir, Mode::Chat);
        let tools = s.config.build_tool_set();
        let client = Scripted::new(vec![Ok(CompletionChoice::text("ok"))]);

        s.send(&client, &tools, &NoopHandler, CancellationToken::new(), "summarize @notes.md")
            .await
            .unwrap();

        let sent = client.requests.lock().unwrap()[0].messages[1].text().to_string();
        assert!(sent.starts_with("summarize\n\n# Attached Files\n"));
        assert!(sent.contains("remember the milk"));
    }

    #[derive(Clone, Default)]
    struct LogBuf(std::sync::Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn turn_events_are_logged_once() {
        use arcane::agent::LoggingHandler;
        use tracing_subscriber::layer::SubscriberExt;

        let buf = LogBuf::default();
        let subscriber =
            tracing_subscriber::registry().with(crate::logging::FileLogLayer::new(buf.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = TempDir::new().unwrap();
        let mut s = session(&dir, Mode::Agent);
        s.config.max_iterations = 1;
        let tools = s.config.build_tool_set();
        let client = Scripted::new(vec![Ok(CompletionChoice::tool_calls(vec![
            ToolCall::new("c1", "frob", "{}"),
            ToolCall::new("c2", "ls", "{}"),
        ]))]);

        s.send(&client, &tools, &LoggingHandler, CancellationToken::new(), "go")
            .await
            .unwrap();

        let log = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(log.matches("Rejected tool call frob").count(), 1, "{log}");
        assert_eq!(log.matches("hit iteration limit").count(), 1, "{log}");
    }

    #[test]
    fn model_switch_and_reset() {
        let mut s = Session::new(CliConfig::default());
        assert_eq!(s.set_model("x-ai/grok-code-fast-1"), "Model: Grok Code Fast 1 (xAI)");
        assert!(s.set_model("acme/x").contains("not in catalog"));
        s.history.push(Message::user("x"));
        s.prompt_tokens = 5;
        s.reset();
        assert!(s.history.is_empty());
        assert_eq!(s.prompt_tokens, 0);
    }

    #[test]
    fn model_list_marks_current() {
        let list = model_list("deepseek/deepseek-v3.2");
        assert_eq!(list.lines().count(), 8);
        assert!(list.lines().any(|l| l.starts_with("* deepseek/deepseek-v3.2")));
    }
}
