//! REPL input reading and parsing.

use std::future::Future;

use tokio::io::{AsyncBufRead, Lines};

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Text to send to the model.
    Prompt(String),
    Agent,
    Chat,
    /// `/model` with no id shows the current model.
    Model(Option<String>),
    Models,
    Reset,
    Usage,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  /agent         switch to agent mode (tools enabled)
  /chat          switch to chat mode
  /model [id]    show or switch the model
  /models        list available models
  /reset         start a new conversation
  /usage         show token usage
  /help          show this help
  /quit          exit

Mention files with @path or @\"path with spaces\" to attach them.";

/// Parse a line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Prompt(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    Some(match name {
        "agent" => Command::Agent,
        "chat" => Command::Chat,
        "model" => Command::Model((!arg.is_empty()).then(|| arg.to_string())),
        "models" => Command::Models,
        "reset" | "new" => Command::Reset,
        "usage" => Command::Usage,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    })
}

/// What the prompt produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// End of input.
    Eof,
    /// Ctrl-C while waiting at the prompt.
    Interrupted,
}

/// Wait for the next line, or for `interrupt` to fire first.
pub async fn next_input<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> std::io::Result<Input> {
    tokio::select! {
        biased;
        () = interrupt => Ok(Input::Interrupted),
        line = lines.next_line() => Ok(line?.map_or(Input::Eof, Input::Line)),
    }
}
