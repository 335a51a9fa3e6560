//! Terminal LLM client with chat and agent modes.
//!
//! Reads the API key from `OPENROUTER_API_KEY`.
//!
//! ```sh
//! # Interactive
//! arcane --workdir /path/to/project
//!
//! # One-shot, agent mode
//! arcane --agent --prompt "What does src/main.rs do?"
//! ```

use std::process::ExitCode;

use arcane::agent::{ChannelHandler, CompositeEventHandler, LoggingHandler, Mode, Notification};
use arcane::tools::ToolSet;
use arcane::{API_KEY_ENV, OpenRouterClient};
use arcane_cli::commands::{Command, HELP, Input, next_input, parse_command};
use arcane_cli::config::log_file_path;
use arcane_cli::session::model_list;
use arcane_cli::{Cli, CliConfig, Session, logging};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Notifications buffered for the printer before new ones are dropped.
const NOTIFICATION_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = CliConfig::from_cli(&cli);

    let log_file = log_file_path(&cli, &config.workdir);
    if let Err(e) = logging::init(&log_file, &cli.log_level, cli.verbose) {
        eprintln!("warning: logging disabled ({}: {e})", log_file.display());
    }

    let client = match OpenRouterClient::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e} (set {API_KEY_ENV})");
            return ExitCode::FAILURE;
        }
    };
    let tools = config.build_tool_set();

    let (channel, notifications) = ChannelHandler::channel(NOTIFICATION_CAPACITY);
    let handler = CompositeEventHandler::new().with(LoggingHandler).with(channel);
    let printer = tokio::spawn(print_notifications(notifications));

    info!(
        "Session start: model={}, mode={}, workdir={}",
        config.model,
        config.mode.label(),
        config.workdir.display()
    );

    let mut session = Session::new(config);
    let code = match cli.prompt.as_deref() {
        Some(prompt) => one_shot(&mut session, &client, &tools, &handler, prompt).await,
        None => repl(&mut session, &client, &tools, &handler).await,
    };

    drop(handler);
    let _ = printer.await;
    code
}

async fn one_shot(
    session: &mut Session,
    client: &OpenRouterClient,
    tools: &ToolSet,
    handler: &CompositeEventHandler,
    prompt: &str,
) -> ExitCode {
    match run_turn(session, client, tools, handler, prompt).await {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn repl(
    session: &mut Session,
    client: &OpenRouterClient,
    tools: &ToolSet,
    handler: &CompositeEventHandler,
) -> ExitCode {
    println!(
        "Arcane ({} mode, {}). Type /help for commands.",
        session.mode().label(),
        session.config.model
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt(session.mode()).await;
        let line = match next_input(&mut lines, interrupted()).await {
            Ok(Input::Line(line)) => line,
            Ok(Input::Eof | Input::Interrupted) => {
                println!();
                break;
            }
            Err(e) => {
                error!("stdin read failed: {e}");
                return ExitCode::FAILURE;
            }
        };

        let Some(command) = parse_command(&line) else {
            continue;
        };
        match command {
            Command::Prompt(text) => match run_turn(session, client, tools, handler, &text).await {
                Ok(answer) => {
                    println!("\nARCANE\n{answer}\n");
                    println!("{}", session.usage_line());
                }
                Err(e) => eprintln!("error: {e}"),
            },
            Command::Agent => {
                session.set_mode(Mode::Agent);
                println!("Agent mode: tools enabled.");
            }
            Command::Chat => {
                session.set_mode(Mode::Chat);
                println!("Chat mode: tools disabled.");
            }
            Command::Model(Some(id)) => println!("{}", session.set_model(&id)),
            Command::Model(None) => println!("Model: {}", session.config.model),
            Command::Models => println!("{}", model_list(&session.config.model)),
            Command::Reset => {
                session.reset();
                println!("New conversation.");
            }
            Command::Usage => println!("{}", session.usage_line()),
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Unknown(name) => eprintln!("unknown command /{name} (try /help)"),
        }
    }
    ExitCode::SUCCESS
}

/// Resolves on Ctrl-C. Once a turn has installed the signal handler,
/// SIGINT no longer ends the process, so the prompt watches for it too.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run a turn that Ctrl-C cancels.
async fn run_turn(
    session: &mut Session,
    client: &OpenRouterClient,
    tools: &ToolSet,
    handler: &CompositeEventHandler,
    input: &str,
) -> Result<String, arcane::error::TurnError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            interrupted().await;
            cancel.cancel();
        })
    };
    let result = session.send(client, tools, handler, cancel, input).await;
    watcher.abort();
    result
}

async fn print_prompt(mode: Mode) {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(format!("{}> ", mode.label()).as_bytes()).await;
    let _ = stdout.flush().await;
}

async fn print_notifications(mut rx: mpsc::Receiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        match notification {
            Notification::ToolStarted { name, .. } => eprintln!("  … {name}"),
            Notification::ToolFinished { summary, .. } => eprintln!("  → {summary}"),
            Notification::Compacted { truncated } => {
                eprintln!("  (compacted {truncated} old tool result(s))");
            }
            Notification::IterationLimit { max_iterations } => {
                eprintln!("  (stopped after {max_iterations} tool iterations)");
            }
            Notification::Usage { .. } => {}
        }
    }
}
