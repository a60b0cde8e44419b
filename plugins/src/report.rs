//! Per-run plugin load summary.

use std::fmt;

use toolbelt_core::Logger;

use crate::error::Diagnostic;
use crate::source::UnitKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Cached,
    Compiled,
    Failed,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cached => write!(f, "cached"),
            Self::Compiled => write!(f, "compiled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub unit: String,
    pub kind: UnitKind,
    pub status: UnitStatus,
    /// Commands the unit contributed before merging.
    pub commands: usize,
    /// Why the unit failed; empty otherwise.
    pub error: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl UnitReport {
    pub fn failed(unit: &str, kind: UnitKind, error: String, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            unit: unit.to_string(),
            kind,
            status: UnitStatus::Failed,
            commands: 0,
            error: Some(error),
            diagnostics,
        }
    }
}

/// Every unit of one scan, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub units: Vec<UnitReport>,
}

impl LoadReport {
    pub fn count(&self, status: UnitStatus) -> usize {
        self.units.iter().filter(|u| u.status == status).count()
    }

    pub fn compilations(&self) -> usize {
        self.count(UnitStatus::Compiled)
    }

    pub fn cache_loads(&self) -> usize {
        self.count(UnitStatus::Cached)
    }

    pub fn failures(&self) -> usize {
        self.count(UnitStatus::Failed)
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Summary lines; quiet unless something was (re)built, failed, or
    /// `verbose` is set. Failures are always reported.
    ///
    /// # Examples
    ///
    /// ```
    /// use toolbelt_plugins::{LoadReport, UnitKind, UnitReport, UnitStatus};
    ///
    /// let report = LoadReport {
    ///     units: vec![UnitReport {
    ///         unit: "hello".into(),
    ///         kind: UnitKind::Standalone,
    ///         status: UnitStatus::Cached,
    ///         commands: 1,
    ///         error: None,
    ///         diagnostics: vec![],
    ///     }],
    /// };
    /// assert!(report.summary_lines(false).is_empty());
    /// assert_eq!(
    ///     report.summary_lines(true),
    ///     vec![
    ///         "Found 1 plugin unit(s), loading...".to_string(),
    ///         "Loaded plugin: hello (1 command(s)) [cached]".to_string(),
    ///     ]
    /// );
    /// ```
    pub fn summary_lines(&self, verbose: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let compiled = self.compilations() > 0;
        if self.units.is_empty() || !(compiled || verbose) {
            return lines;
        }

        let action = if compiled { "compiling" } else { "loading" };
        lines.push(format!("Found {} plugin unit(s), {action}...", self.units.len()));
        for unit in &self.units {
            let show = match unit.status {
                UnitStatus::Compiled => true,
                UnitStatus::Cached => verbose,
                UnitStatus::Failed => false,
            };
            if show {
                lines.push(format!(
                    "Loaded plugin: {} ({} command(s)) [{}]",
                    unit.unit, unit.commands, unit.status
                ));
            }
        }
        lines
    }

    /// Writes the summary; failures go out as errors regardless of
    /// verbosity.
    pub fn log(&self, logger: &dyn Logger, verbose: bool) {
        for line in self.summary_lines(verbose) {
            if line.starts_with("Found ") {
                logger.info(&line);
            } else {
                logger.success(&line);
            }
        }
        for unit in self.units.iter().filter(|u| u.status == UnitStatus::Failed) {
            let reason = unit.error.as_deref().unwrap_or("unknown error");
            logger.error(&format!("Failed to load plugin {}: {reason}", unit.unit));
            for diagnostic in &unit.diagnostics {
                logger.error(&format!("  {diagnostic}"));
            }
        }
    }
}
