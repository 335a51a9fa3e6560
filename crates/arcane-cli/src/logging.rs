//! Logging setup.
//!
//! Events go to a log file so they never interleave with the REPL. Each
//! event becomes one line:
//!
//! ```text
//! 14:03:27.512 INFO  arcane::agent::orchestrator: Starting agent turn: model=... history=2
//! ```
//!
//! Filtering comes from `ARCANE_LOG` when set, else from `--log-level`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable overriding `--log-level`.
pub const LOG_ENV: &str = "ARCANE_LOG";

/// A layer that appends formatted events to a writer.
pub struct FileLogLayer {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl FileLogLayer {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Open `path` for appending, creating parent directories.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for FileLogLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let line = format_line(
            &Local::now().format("%H:%M:%S%.3f").to_string(),
            meta.level(),
            meta.target(),
            &visitor,
        );

        // A poisoned lock or failed write drops the line; logging must not
        // take the session down.
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
            let _ = writer.flush();
        }
    }
}

fn format_line(time: &str, level: &tracing::Level, target: &str, visitor: &MessageVisitor) -> String {
    let mut line = format!("{time} {:<5} {target}: {}", level.as_str(), visitor.message);
    for (key, value) in &visitor.fields {
        line.push_str(&format!(" {key}={value}"));
    }
    line
}

/// Extracts the message and extra fields from an event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }
}

/// Filter from [`LOG_ENV`], falling back to `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: file layer, plus stderr when `verbose`.
pub fn init(log_file: &Path, default_level: &str, verbose: bool) -> std::io::Result<()> {
    let file_layer = FileLogLayer::open(log_file)?;
    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}
