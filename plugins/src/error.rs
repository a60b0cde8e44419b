//! Error types for plugin compilation, caching and loading.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::artifact::ModuleId;

/// One compiler message, located in the original source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source file as shown to the user (relative to the plugin root).
    pub file: String,
    /// 1-based line in `file`.
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.file, self.line, self.message)
    }
}

/// A unit failed to build. Only that unit is skipped.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{} compilation error(s)", .0.len())]
    Diagnostics(Vec<Diagnostic>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toolchain failed: {0}")]
    Toolchain(String),

    #[error("toolchain timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid artifact: {0}")]
    Artifact(#[from] serde_json::Error),
}

impl CompileError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Diagnostics(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported artifact format version {0}")]
    UnsupportedFormat(u32),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl CacheError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Compile(err) => err.diagnostics(),
            _ => &[],
        }
    }
}

/// Explicit module unload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnloadError {
    #[error("module is still referenced by {0} command(s)")]
    InUse(usize),

    #[error("unknown module {0}")]
    Unknown(ModuleId),
}

/// Plugin directory could not be scanned at all.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("cannot scan plugin directory {path}: {source}")]
    Scan {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
