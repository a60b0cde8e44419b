//! The compiler capability.
//!
//! [`ScriptCompiler`] builds artifacts in-process. [`ExternalCompiler`]
//! runs a configured toolchain as a subprocess with a timeout, which lets a
//! deployment swap in its own front end without touching the cache or the
//! loader.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::artifact::Artifact;
use crate::error::{CompileError, Diagnostic};
use crate::source::{PreparedSource, SourceUnit};
use crate::script;

/// Everything a compiler needs for one unit.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub unit: &'a SourceUnit,
    pub prepared: &'a PreparedSource,
    /// Scratch directory for intermediate files.
    pub work_dir: &'a Path,
}

impl CompileRequest<'_> {
    /// Maps a line of the prepared text to a diagnostic in the original file.
    pub fn diagnostic(&self, line: usize, message: impl Into<String>) -> Diagnostic {
        let (file, line) = match self.prepared.map.locate(line) {
            Some((file, line)) => (file.to_string(), line),
            None => (self.unit.name.clone(), line),
        };
        Diagnostic {
            file,
            line,
            message: message.into(),
        }
    }
}

/// Turns prepared plugin source into an [`Artifact`].
pub trait Compiler: Send + Sync {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<Artifact, CompileError>;
}

/// In-process compiler for the plugin script language.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptCompiler;

impl Compiler for ScriptCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<Artifact, CompileError> {
        match script::parse(&request.prepared.text) {
            Ok(types) => Ok(Artifact::new(&request.unit.name, types)),
            Err(errors) => Err(CompileError::Diagnostics(
                errors
                    .into_iter()
                    .map(|e| request.diagnostic(e.line, e.message))
                    .collect(),
            )),
        }
    }
}

/// Runs `<command...> <source> <artifact>` and reads the JSON artifact the
/// toolchain wrote. Stderr lines shaped `<line>: <message>` become
/// diagnostics.
#[derive(Debug, Clone)]
pub struct ExternalCompiler {
    command: Vec<String>,
    timeout: Duration,
}

impl ExternalCompiler {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn paths(&self, request: &CompileRequest<'_>) -> (PathBuf, PathBuf) {
        (
            request.unit.cache_file(request.work_dir, "source"),
            request.unit.cache_file(request.work_dir, "artifact.tmp"),
        )
    }
}

static DIAGNOSTIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*:\s*(.+)$").expect("static regex must compile"));

impl Compiler for ExternalCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<Artifact, CompileError> {
        let Some((program, base_args)) = self.command.split_first() else {
            return Err(CompileError::Toolchain("no compiler command configured".into()));
        };
        let (source_path, output_path) = self.paths(request);
        if let Some(parent) = source_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&source_path, &request.prepared.text)?;
        let _ = std::fs::remove_file(&output_path);

        debug!(program = %program, unit = %request.unit.name, "running external compiler");
        let mut child = Command::new(program)
            .args(base_args)
            .arg(&source_path)
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CompileError::Toolchain(format!("cannot start '{program}': {e}")))?;

        // Drain stderr concurrently so a chatty toolchain cannot block on a
        // full pipe.
        let stderr_thread = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let waited = child.wait_timeout(self.timeout);
        let _ = std::fs::remove_file(&source_path);
        let status = match waited? {
            Some(status) => status,
            None => {
                warn!(
                    program = %program,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "compiler timed out, killing process"
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(CompileError::Timeout(self.timeout));
            }
        };
        let stderr = stderr_thread
            .and_then(|t| t.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let diagnostics: Vec<Diagnostic> = stderr
                .lines()
                .filter_map(|line| DIAGNOSTIC_RE.captures(line))
                .filter_map(|caps| {
                    let line = caps[1].parse::<usize>().ok()?;
                    Some(request.diagnostic(line, caps[2].trim()))
                })
                .collect();
            if diagnostics.is_empty() {
                return Err(CompileError::Toolchain(format!(
                    "'{program}' exited with {status}: {}",
                    stderr.trim()
                )));
            }
            return Err(CompileError::Diagnostics(diagnostics));
        }

        let raw = std::fs::read_to_string(&output_path)?;
        let _ = std::fs::remove_file(&output_path);
        let mut artifact: Artifact = serde_json::from_str(&raw)?;
        artifact.unit = request.unit.name.clone();
        Ok(artifact)
    }
}
