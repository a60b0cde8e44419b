//! User-facing output service.
//!
//! Commands report progress and results through a [`Logger`] resolved from
//! the [`ServiceContainer`](crate::ServiceContainer). Internal diagnostics go
//! through `tracing` instead.

use std::fmt;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

pub trait Logger: Send + Sync {
    fn log(&self, severity: Severity, message: &str);

    /// Writes one unformatted line.
    fn write(&self, line: &str);

    fn debug(&self, message: &str) {
        self.log(Severity::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(Severity::Info, message);
    }

    fn success(&self, message: &str) {
        self.log(Severity::Success, message);
    }

    fn warning(&self, message: &str) {
        self.log(Severity::Warning, message);
    }

    fn error(&self, message: &str) {
        self.log(Severity::Error, message);
    }
}

/// Plain console logger: warnings and errors to stderr, the rest to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleLogger {
    show_debug: bool,
}

impl ConsoleLogger {
    pub fn new(show_debug: bool) -> Self {
        Self { show_debug }
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug if !self.show_debug => {}
            Severity::Warning | Severity::Error => {
                let _ = writeln!(std::io::stderr().lock(), "{message}");
            }
            _ => {
                let _ = writeln!(std::io::stdout().lock(), "{message}");
            }
        }
    }

    fn write(&self, line: &str) {
        let _ = writeln!(std::io::stdout().lock(), "{line}");
    }
}

/// One captured line; `severity` is `None` for raw writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub severity: Option<Severity>,
    pub text: String,
}

/// In-memory logger for embedding and tests.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<LogLine>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages logged with `severity`, in order.
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.severity == Some(severity))
            .map(|line| line.text)
            .collect()
    }

    /// Every captured line joined with newlines.
    pub fn output(&self) -> String {
        self.lines()
            .into_iter()
            .map(|line| line.text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.text.contains(needle))
    }

    fn push(&self, severity: Option<Severity>, text: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogLine {
                severity,
                text: text.to_string(),
            });
    }
}

impl Logger for RecordingLogger {
    fn log(&self, severity: Severity, message: &str) {
        self.push(Some(severity), message);
    }

    fn write(&self, line: &str) {
        self.push(None, line);
    }
}
