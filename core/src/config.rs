//! Runtime configuration.
//!
//! Loaded from a YAML file (by default `toolbelt.yml` next to the
//! executable). Every field has a default, so a partial file is valid and a
//! missing file yields [`RuntimeConfig::default`].
//!
//! # Example YAML
//!
//! ```yaml
//! program: toolbelt
//! plugins:
//!   enabled: true
//!   directory: plugins
//!   cache_dir: .cache
//!   extension: tb
//!   verbose: false
//! compiler:
//!   kind: builtin
//!   timeout_ms: 30000
//! help:
//!   auto_confirm: true
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::types::DEFAULT_PROGRAM;

/// File name looked up next to the executable.
pub const CONFIG_FILE_NAME: &str = "toolbelt.yml";

/// Plugin directory scanning settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    pub enabled: bool,
    /// Plugin root; relative paths are resolved against a base directory.
    pub directory: PathBuf,
    /// Cache subdirectory inside the plugin root.
    pub cache_dir: String,
    /// Source file extension, without the dot.
    pub extension: String,
    /// Log per-unit detail even for cache hits.
    pub verbose: bool,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("plugins"),
            cache_dir: ".cache".to_string(),
            extension: "tb".to_string(),
            verbose: false,
        }
    }
}

impl PluginSettings {
    pub fn resolve_directory(&self, base: &Path) -> PathBuf {
        if self.directory.is_absolute() {
            self.directory.clone()
        } else {
            base.join(&self.directory)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilerKind {
    /// In-process script compiler.
    #[default]
    Builtin,
    /// External toolchain invoked as a subprocess.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    pub kind: CompilerKind,
    /// Toolchain argv; the source and artifact paths are appended.
    pub command: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            kind: CompilerKind::Builtin,
            command: Vec::new(),
            timeout_ms: 30_000,
        }
    }
}

impl CompilerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpSettings {
    /// Offer to run the single remaining candidate of a search.
    pub auto_confirm: bool,
}

impl Default for HelpSettings {
    fn default() -> Self {
        Self { auto_confirm: true }
    }
}

/// Top-level runtime configuration.
///
/// # Examples
///
/// ```
/// use toolbelt_core::RuntimeConfig;
///
/// let config: RuntimeConfig = serde_yaml::from_str("plugins:\n  verbose: true\n").unwrap();
/// assert!(config.plugins.verbose);
/// assert_eq!(config.program, "toolbelt");
/// assert_eq!(config.plugins.extension, "tb");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Usage prefix shown in help and usage lines.
    pub program: String,
    pub plugins: PluginSettings,
    pub compiler: CompilerSettings,
    pub help: HelpSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            plugins: PluginSettings::default(),
            compiler: CompilerSettings::default(),
            help: HelpSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.program, "toolbelt");
        assert!(config.plugins.enabled);
        assert_eq!(config.plugins.cache_dir, ".cache");
        assert_eq!(config.compiler.kind, CompilerKind::Builtin);
        assert_eq!(config.compiler.timeout(), Duration::from_secs(30));
        assert!(config.help.auto_confirm);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
program: tb
compiler:
  kind: external
  command: [tbc, --json]
help:
  auto_confirm: false
"#;
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.program, "tb");
        assert_eq!(config.compiler.kind, CompilerKind::External);
        assert_eq!(config.compiler.command, vec!["tbc", "--json"]);
        assert_eq!(config.compiler.timeout_ms, 30_000);
        assert!(!config.help.auto_confirm);
        assert_eq!(config.plugins, PluginSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = RuntimeConfig::default();
        config.plugins.verbose = true;
        config.plugins.directory = PathBuf::from("/opt/toolbelt/plugins");
        config.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::load_or_default(dir.path().join("absent.yml")).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "plugins: [not, a, map]\n").unwrap();
        assert!(matches!(
            RuntimeConfig::load_or_default(&path),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_resolve_directory() {
        let settings = PluginSettings::default();
        assert_eq!(
            settings.resolve_directory(Path::new("/usr/local/bin")),
            PathBuf::from("/usr/local/bin/plugins")
        );
    }
}
