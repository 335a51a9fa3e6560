//! The `bash` tool: `sh -c` with a wall-clock timeout.
//!
//! stdout and stderr are drained concurrently into one buffer, so output
//! written before a timeout is kept, up to a capture cap. The child's
//! process group is killed on timeout and when the future is dropped
//! (turn cancellation).

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::ToolDef;
use crate::error::ToolError;
use crate::json_schema_for;
use crate::tools::core::{Tool, ToolFuture, parse_tool_args, truncate_chars};
use crate::tools::names;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::warn;

// ── Limits ──────────────────────────────────────────────────────────

pub const DEFAULT_BASH_TIMEOUT: Duration = Duration::from_secs(30);

/// Output above this many characters is truncated.
pub const MAX_BASH_OUTPUT: usize = 4000;

/// Lines kept at each end when long output is cut by lines.
pub const KEEP_LINES: usize = 10;

/// Returned when a successful command prints nothing.
pub const EMPTY_OUTPUT: &str = "(empty)";

/// Bytes of combined output kept; the rest is read and discarded.
const MAX_CAPTURE: usize = MAX_BASH_OUTPUT * 16;

/// How long to wait for pipe readers after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Deserialize, JsonSchema)]
pub struct BashArgs {
    /// Shell command, run with `sh -c` in the working directory.
    pub cmd: String,
}

pub struct Bash {
    workdir: PathBuf,
    timeout: Duration,
}

impl Bash {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_BASH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Tool for Bash {
    fn definition(&self) -> ToolDef {
        ToolDef::new(names::BASH, "Run shell command", json_schema_for::<BashArgs>())
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<BashArgs>(arguments);
        Box::pin(async move {
            let args = parsed?;
            let run = run_shell(&self.workdir, &args.cmd, self.timeout).await?;
            finish_output(run, self.timeout)
        })
    }
}

/// Raw result of one shell run.
#[derive(Debug)]
pub struct ShellRun {
    pub output: String,
    /// Exit code, `None` when killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Spawn `sh -c command` in `workdir` and collect combined output.
///
/// The shell leads its own process group. On timeout, or when this future
/// is dropped mid-run, the whole group is killed so grandchildren go too.
pub async fn run_shell(
    workdir: &std::path::Path,
    command: &str,
    timeout: Duration,
) -> Result<ShellRun, ToolError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    let mut child = cmd
        .spawn()
        .map_err(|e| ToolError::Command(format!("failed to spawn sh: {e}")))?;
    let mut group = ProcessGroup::new(child.id());

    let buffer = Arc::new(Mutex::new(Vec::new()));
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(drain(stdout, Arc::clone(&buffer))));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(drain(stderr, Arc::clone(&buffer))));
    }

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            group.disarm();
            (status.code(), false)
        }
        Ok(Err(e)) => return Err(ToolError::Command(format!("wait failed: {e}"))),
        Err(_) => {
            warn!("bash command timed out after {}: {command}", format_timeout(timeout));
            group.kill();
            if let Err(e) = child.kill().await {
                warn!("failed to kill timed-out command: {e}");
            }
            (None, true)
        }
    };

    // Background children may hold the pipes open; don't wait on them forever.
    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    for reader in &mut readers {
        if tokio::time::timeout_at(deadline, reader).await.is_err() {
            break;
        }
    }
    for reader in &readers {
        reader.abort();
    }

    let bytes = match buffer.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };

    Ok(ShellRun {
        output: String::from_utf8_lossy(&bytes).trim().to_string(),
        exit_code,
        timed_out,
    })
}

/// Kills a child's process group when dropped, unless disarmed.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    /// The shell exited on its own; leave the group alone.
    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        if let Ok(pgid) = libc::pid_t::try_from(pgid) {
            // SAFETY: killpg only sends a signal; an unknown group yields ESRCH.
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc != 0 {
                warn!(
                    "failed to kill process group {pgid}: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn drain(mut pipe: impl AsyncRead + Unpin, buffer: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Ok(mut buf) = buffer.lock() {
                    let room = MAX_CAPTURE.saturating_sub(buf.len());
                    buf.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
    }
}

/// `30s`, or `300ms` below a second.
fn format_timeout(timeout: Duration) -> String {
    if timeout.subsec_millis() == 0 && timeout.as_secs() > 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}

/// Turn a run into the text the model sees.
pub fn finish_output(run: ShellRun, timeout: Duration) -> Result<String, ToolError> {
    if run.output.is_empty() {
        if run.timed_out {
            return Err(ToolError::Command(format!(
                "command timed out after {}",
                format_timeout(timeout)
            )));
        }
        return match run.exit_code {
            Some(0) => Ok(EMPTY_OUTPUT.to_string()),
            Some(code) => Err(ToolError::Command(format!("exit status {code}"))),
            None => Err(ToolError::Command("terminated by signal".into())),
        };
    }

    let mut text = truncate_output(&run.output);
    if run.timed_out {
        text.push_str(&format!(
            "\n[... timed out after {}, process killed]",
            format_timeout(timeout)
        ));
    }
    Ok(text)
}

/// Keep head and tail lines of long output, or cut it at the size cap.
pub fn truncate_output(output: &str) -> String {
    if output.chars().count() <= MAX_BASH_OUTPUT {
        return output.to_string();
    }
    let lines: Vec<&str> = output.split('\n').collect();
    if lines.len() > KEEP_LINES * 2 {
        let head = lines[..KEEP_LINES].join("\n");
        let tail = lines[lines.len() - KEEP_LINES..].join("\n");
        let dropped = lines.len() - KEEP_LINES * 2;
        format!("{head}\n\n[... {dropped} lines truncated ...]\n\n{tail}")
    } else {
        format!("{}\n[... output truncated]", truncate_chars(output, MAX_BASH_OUTPUT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::core::ToolSet;
    use tempfile::TempDir;

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let dir = TempDir::new().unwrap();
        let set = ToolSet::new().with(Bash::new(dir.path()));
        let result = set.execute("bash", r#"{"cmd": "echo out; echo err 1>&2"}"#).await;
        assert!(result.contains("out"), "{result}");
        assert!(result.contains("err"), "{result}");
    }

    #[tokio::test]
    async fn runs_in_workdir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let set = ToolSet::new().with(Bash::new(dir.path()));
        assert_eq!(set.execute("bash", r#"{"cmd": "ls"}"#).await, "marker.txt");
    }

    #[tokio::test]
    async fn silent_success_is_empty_marker() {
        let dir = TempDir::new().unwrap();
        let set = ToolSet::new().with(Bash::new(dir.path()));
        assert_eq!(set.execute("bash", r#"{"cmd": "true"}"#).await, EMPTY_OUTPUT);
    }

    #[tokio::test]
    async fn silent_failure_returns_error_text() {
        let dir = TempDir::new().unwrap();
        let set = ToolSet::new().with(Bash::new(dir.path()));
        assert_eq!(
            set.execute("bash", r#"{"cmd": "exit 3"}"#).await,
            "error: exit status 3"
        );
    }

    #[tokio::test]
    async fn timeout_keeps_partial_output() {
        let dir = TempDir::new().unwrap();
        let set = ToolSet::new()
            .with(Bash::new(dir.path()).with_timeout(Duration::from_millis(300)));
        let result = set
            .execute("bash", r#"{"cmd": "echo started; sleep 5"}"#)
            .await;
        assert!(result.starts_with("started"), "{result}");
        assert!(result.contains("timed out"), "{result}");
    }

    #[tokio::test]
    async fn timeout_kills_grandchildren() {
        let dir = TempDir::new().unwrap();
        let set = ToolSet::new()
            .with(Bash::new(dir.path()).with_timeout(Duration::from_millis(300)));
        let result = set
            .execute(
                "bash",
                r#"{"cmd": "echo started; sh -c 'sleep 1; touch late.txt'; sleep 5"}"#,
            )
            .await;
        assert_eq!(result, "started\n[... timed out after 300ms, process killed]");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("late.txt").exists());
    }

    #[tokio::test]
    async fn runaway_output_is_capped() {
        let dir = TempDir::new().unwrap();
        let run = run_shell(dir.path(), "yes", Duration::from_millis(300))
            .await
            .unwrap();
        assert!(run.timed_out);
        assert!(run.output.len() <= MAX_CAPTURE);
    }

    #[test]
    fn timeout_formatting() {
        assert_eq!(format_timeout(DEFAULT_BASH_TIMEOUT), "30s");
        assert_eq!(format_timeout(Duration::from_millis(300)), "300ms");
        assert_eq!(format_timeout(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn long_multiline_output_keeps_head_and_tail() {
        let output: Vec<String> = (1..=100).map(|i| format!("{i:0>60}")).collect();
        let text = truncate_output(&output.join("\n"));
        assert!(text.starts_with(&output[0]));
        assert!(text.ends_with(&output[99]));
        assert!(text.contains("\n\n[... 80 lines truncated ...]\n\n"));
    }

    #[test]
    fn long_single_line_output_is_cut() {
        let text = truncate_output(&"z".repeat(5000));
        assert_eq!(
            text,
            format!("{}\n[... output truncated]", "z".repeat(MAX_BASH_OUTPUT))
        );
    }

    #[test]
    fn short_output_untouched() {
        assert_eq!(truncate_output("a\nb"), "a\nb");
    }
}
