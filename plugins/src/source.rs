//! Plugin source units and prelude injection.
//!
//! A unit is one or more source files compiled together: a root-level file
//! on its own, or every file below a first-level subdirectory. Prelude lines
//! (required imports and a namespace) are prepended to the compiled text
//! only when their literal text is absent. Detection is textual, so an
//! import written differently gets a harmless duplicate.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use toolbelt_core::PLUGIN_ROOT;

/// Imports every unit needs.
pub const REQUIRED_IMPORTS: [&str; 3] = ["use console;", "use process;", "use validation;"];

/// File name shown for prelude lines in diagnostics.
const PRELUDE_NAME: &str = "<prelude>";

/// Cache subdirectory holding group unit entries.
pub const GROUP_CACHE_DIR: &str = "groups";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitKind {
    /// A root-level file.
    Standalone,
    /// All files of a first-level subdirectory, one command group.
    Group,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone => write!(f, "standalone"),
            Self::Group => write!(f, "group"),
        }
    }
}

/// Where a unit's files are, before anything is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitLocation {
    pub name: String,
    pub kind: UnitKind,
    /// Files in compilation order.
    pub paths: Vec<PathBuf>,
    /// Directory display names are relative to.
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Name used in diagnostics.
    pub display: String,
    pub text: String,
}

/// One compilation unit with its file texts in stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub name: String,
    pub kind: UnitKind,
    pub files: Vec<SourceFile>,
}

impl SourceUnit {
    /// Reads every file of `location`. Fails on unreadable or non-UTF-8
    /// files.
    pub fn read(location: &UnitLocation) -> std::io::Result<Self> {
        let files = location
            .paths
            .iter()
            .map(|path| {
                Ok(SourceFile {
                    path: path.clone(),
                    display: display_name(path, &location.root),
                    text: std::fs::read_to_string(path)?,
                })
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self {
            name: location.name.clone(),
            kind: location.kind,
            files,
        })
    }

    /// Builds a unit from in-memory texts, keeping the given order.
    pub fn from_texts(name: &str, kind: UnitKind, texts: Vec<(PathBuf, String)>) -> Self {
        let files = texts
            .into_iter()
            .map(|(path, text)| SourceFile {
                display: path.display().to_string(),
                path,
                text,
            })
            .collect();
        Self {
            name: name.to_string(),
            kind,
            files,
        }
    }

    /// Cache file of this unit below `dir` with the given extension. Group
    /// units live in their own subdirectory so no root file name can share
    /// their cache files.
    pub fn cache_file(&self, dir: &Path, extension: &str) -> PathBuf {
        let file = format!("{}.{extension}", self.name);
        match self.kind {
            UnitKind::Standalone => dir.join(file),
            UnitKind::Group => dir.join(GROUP_CACHE_DIR).join(file),
        }
    }

    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Hex SHA-256 over the concatenated file texts.
    ///
    /// # Examples
    ///
    /// ```
    /// use toolbelt_plugins::{SourceUnit, UnitKind};
    ///
    /// let a = SourceUnit::from_texts("a", UnitKind::Standalone, vec![("a.tb".into(), "x".into())]);
    /// let b = SourceUnit::from_texts("b", UnitKind::Standalone, vec![("b.tb".into(), "x".into())]);
    /// assert_eq!(a.content_hash(), b.content_hash());
    /// assert_eq!(a.content_hash().len(), 64);
    /// ```
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for file in &self.files {
            hasher.update(file.text.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Namespace synthesized for this unit.
    pub fn namespace(&self) -> String {
        match self.kind {
            UnitKind::Standalone => PLUGIN_ROOT.to_string(),
            UnitKind::Group => format!("{PLUGIN_ROOT}.{}", self.name),
        }
    }

    /// Concatenates the files and prepends missing prelude lines.
    pub fn prepare(&self) -> PreparedSource {
        let body = self
            .files
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let mut prelude: Vec<String> = REQUIRED_IMPORTS
            .iter()
            .filter(|import| !body.contains(*import))
            .map(|import| import.to_string())
            .collect();
        match self.kind {
            UnitKind::Standalone if !body.contains("namespace") => {
                prelude.push(format!("namespace {};", self.namespace()));
            }
            UnitKind::Group => {
                let declaration = format!("namespace {};", self.namespace());
                if !body.contains(&declaration) {
                    prelude.push(declaration);
                }
            }
            UnitKind::Standalone => {}
        }

        let mut map = SourceMap::default();
        let mut text = String::new();
        if !prelude.is_empty() {
            map.push(PRELUDE_NAME, prelude.len());
            for line in &prelude {
                text.push_str(line);
                text.push('\n');
            }
        }
        for file in &self.files {
            map.push(&file.display, file.text.lines().count());
            text.push_str(&file.text);
            if !file.text.is_empty() && !file.text.ends_with('\n') {
                text.push('\n');
            }
        }

        PreparedSource { text, map }
    }
}

/// Compiler input: prelude plus concatenated files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSource {
    pub text: String,
    pub map: SourceMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    file: String,
    first: usize,
    lines: usize,
}

/// Translates lines of the prepared text back to `(file, line)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    segments: Vec<Segment>,
}

impl SourceMap {
    fn push(&mut self, file: &str, lines: usize) {
        let first = self
            .segments
            .last()
            .map(|s| s.first + s.lines)
            .unwrap_or(1);
        self.segments.push(Segment {
            file: file.to_string(),
            first,
            lines,
        });
    }

    /// Maps a 1-based line of the prepared text.
    pub fn locate(&self, line: usize) -> Option<(&str, usize)> {
        self.segments
            .iter()
            .find(|s| line >= s.first && line < s.first + s.lines)
            .map(|s| (s.file.as_str(), line - s.first + 1))
    }
}

fn display_name(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
