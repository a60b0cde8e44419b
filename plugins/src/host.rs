//! Plugin directory scan, compile and load.
//!
//! ```text
//! <root>/hello.tb          standalone unit "hello"
//! <root>/office/*.tb       group unit "office" (recursive)
//! <root>/<cache_dir>/      compilation cache, never scanned
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use toolbelt_core::{
    Catalog, CatalogEntry, CommandGroup, CompilerKind, CompilerSettings, MetadataIndex,
    PluginSettings,
};

use crate::artifact::ModuleRegistry;
use crate::cache::{CacheOutcome, CacheStatus, CompilationCache};
use crate::compiler::{Compiler, ExternalCompiler, ScriptCompiler};
use crate::error::{CacheError, PluginError};
use crate::loader::load_module;
use crate::report::{LoadReport, UnitReport, UnitStatus};
use crate::source::{SourceUnit, UnitKind, UnitLocation};

/// Builds the compiler selected by `settings`.
pub fn compiler_from_settings(settings: &CompilerSettings) -> Arc<dyn Compiler> {
    match settings.kind {
        CompilerKind::Builtin => Arc::new(ScriptCompiler),
        CompilerKind::External => Arc::new(ExternalCompiler::new(
            settings.command.clone(),
            settings.timeout(),
        )),
    }
}

/// Commands from one scan, ready to merge.
#[derive(Debug, Default)]
pub struct PluginLoad {
    pub report: LoadReport,
    pub commands: Vec<CatalogEntry>,
    pub groups: Vec<CommandGroup>,
}

impl PluginLoad {
    /// Merges into `catalog`: top-level commands are inserted, groups are
    /// inserted or appended to an existing group of the same name. Returns
    /// the number of commands actually added.
    pub fn merge_into(self, catalog: &mut Catalog) -> usize {
        let mut added = 0;
        for entry in self.commands {
            if catalog.insert_command(entry) {
                added += 1;
            }
        }
        for group in self.groups {
            added += catalog.merge_group(group);
        }
        debug!(added, "plugin commands merged");
        added
    }
}

/// Owns the cache and the module registry for one plugin root.
#[derive(Debug)]
pub struct PluginHost {
    root: PathBuf,
    cache_dir: String,
    extension: String,
    cache: CompilationCache,
    modules: ModuleRegistry,
}

impl PluginHost {
    pub fn new(root: PathBuf, cache_dir: &str, extension: &str, compiler: Arc<dyn Compiler>) -> Self {
        let cache = CompilationCache::new(root.join(cache_dir), compiler);
        Self {
            root,
            cache_dir: cache_dir.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            cache,
            modules: ModuleRegistry::new(),
        }
    }

    /// Host for the configured plugin directory, relative to `base`.
    pub fn from_settings(plugins: &PluginSettings, compiler: &CompilerSettings, base: &Path) -> Self {
        Self::new(
            plugins.resolve_directory(base),
            &plugins.cache_dir,
            &plugins.extension,
            compiler_from_settings(compiler),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &CompilationCache {
        &self.cache
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Lists units in sorted order. A missing root yields no units.
    pub fn discover_units(&self) -> Result<Vec<UnitLocation>, PluginError> {
        if !self.root.is_dir() {
            debug!(root = %self.root.display(), "plugin directory not found");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in read_dir_sorted(&self.root)? {
            if entry.is_dir() {
                if entry.file_name().is_some_and(|n| n == self.cache_dir.as_str()) {
                    continue;
                }
                dirs.push(entry);
            } else if self.is_source(&entry) {
                files.push(entry);
            }
        }

        let mut units = Vec::new();
        for path in files {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            units.push(UnitLocation {
                name,
                kind: UnitKind::Standalone,
                paths: vec![path],
                root: self.root.clone(),
            });
        }
        for dir in dirs {
            let mut paths = Vec::new();
            self.collect_sources(&dir, &mut paths)?;
            if paths.is_empty() {
                debug!(dir = %dir.display(), "no plugin sources in directory");
                continue;
            }
            let Some(name) = dir.file_name().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            units.push(UnitLocation {
                name,
                kind: UnitKind::Group,
                paths,
                root: self.root.clone(),
            });
        }
        Ok(units)
    }

    /// Scans, compiles (in parallel, through the cache) and loads every
    /// unit. A failing unit is reported and skipped; siblings still load.
    pub fn load(&self, index: &MetadataIndex) -> Result<PluginLoad, PluginError> {
        let (locations, rejected): (Vec<UnitLocation>, Vec<UnitLocation>) = self
            .discover_units()?
            .into_iter()
            .partition(|location| {
                location.kind != UnitKind::Group || is_group_name(&location.name)
            });
        info!(root = %self.root.display(), units = locations.len(), "loading plugins");

        let built: Vec<(UnitLocation, Result<CacheOutcome, CacheError>)> = locations
            .into_par_iter()
            .map(|location| {
                let outcome = SourceUnit::read(&location)
                    .map_err(CacheError::from)
                    .and_then(|unit| self.cache.compile(&unit));
                (location, outcome)
            })
            .collect();

        let mut load = PluginLoad::default();
        for location in rejected {
            warn!(unit = %location.name, "directory name cannot be a group name, skipped");
            load.report.units.push(UnitReport::failed(
                &location.name,
                location.kind,
                format!(
                    "'{}' is not a valid group name (use letters, digits, '_' or '-')",
                    location.name
                ),
                Vec::new(),
            ));
        }
        for (location, outcome) in built {
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(unit = %location.name, error = %err, "plugin unit failed");
                    load.report.units.push(UnitReport::failed(
                        &location.name,
                        location.kind,
                        err.to_string(),
                        err.diagnostics().to_vec(),
                    ));
                    continue;
                }
            };

            let status = match outcome.status {
                CacheStatus::Hit => UnitStatus::Cached,
                CacheStatus::Compiled => UnitStatus::Compiled,
            };
            let module = self.modules.register(outcome.artifact);
            let loaded = load_module(&module, index);
            load.report.units.push(UnitReport {
                unit: location.name.clone(),
                kind: location.kind,
                status,
                commands: loaded.command_count(),
                error: None,
                diagnostics: Vec::new(),
            });
            load.commands.extend(loaded.commands);
            load.groups.extend(loaded.groups);
        }

        let stats = self.cache.stats();
        info!(
            compilations = stats.compilations,
            cache_loads = stats.cache_loads,
            failures = load.report.failures(),
            "plugins loaded"
        );
        Ok(load)
    }

    fn is_source(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(self.extension.as_str()))
    }

    fn collect_sources(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PluginError> {
        for path in read_dir_sorted(dir)? {
            if path.is_dir() {
                self.collect_sources(&path, out)?;
            } else if self.is_source(&path) {
                out.push(path);
            }
        }
        Ok(())
    }
}

/// Group directories become one namespace segment, so dots, spaces and
/// punctuation are out.
fn is_group_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
    let scan_error = |source| PluginError::Scan {
        path: dir.display().to_string(),
        source,
    };
    let mut paths = std::fs::read_dir(dir)
        .map_err(scan_error)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(scan_error)?;
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, text: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, text).unwrap();
    }

    fn host(root: &Path) -> PluginHost {
        PluginHost::new(root.to_path_buf(), ".cache", "tb", Arc::new(ScriptCompiler))
    }

    #[test]
    fn test_missing_directory_has_no_units() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(&dir.path().join("absent"));
        assert!(host.discover_units().unwrap().is_empty());
        let load = host.load(&MetadataIndex::new()).unwrap();
        assert!(load.report.is_empty());
    }

    #[test]
    fn test_discover_units_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("zeta.tb"), "");
        write(&root.join("alpha.TB"), "");
        write(&root.join("notes.txt"), "");
        write(&root.join("office/word.tb"), "");
        write(&root.join("office/deep/excel.tb"), "");
        write(&root.join("empty/readme.md"), "");
        write(&root.join(".cache/stale.tb"), "");

        let units = host(root).discover_units().unwrap();
        let summary: Vec<(String, UnitKind, usize)> = units
            .iter()
            .map(|u| (u.name.clone(), u.kind, u.paths.len()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("alpha".to_string(), UnitKind::Standalone, 1),
                ("zeta".to_string(), UnitKind::Standalone, 1),
                ("office".to_string(), UnitKind::Group, 2),
            ]
        );
        let office = &units[2];
        assert_eq!(office.paths[0], root.join("office/deep/excel.tb"));
        assert_eq!(office.paths[1], root.join("office/word.tb"));
    }

    #[test]
    fn test_failing_unit_does_not_block_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("good.tb"), "command Good {\n    print \"ok\"\n}\n");
        write(&root.join("bad.tb"), "command Bad {\n    shout \"no\"\n}\n");

        let load = host(root).load(&MetadataIndex::new()).unwrap();
        assert_eq!(load.commands.len(), 1);
        assert_eq!(load.commands[0].name(), "good");
        assert_eq!(load.report.failures(), 1);

        let bad = &load.report.units[0];
        assert_eq!(bad.unit, "bad");
        assert_eq!(bad.status, UnitStatus::Failed);
        assert_eq!(bad.diagnostics[0].to_string(), "[bad.tb:2] unknown statement 'shout'");
    }

    #[test]
    fn test_group_directory_names_must_be_one_segment() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let body = "command Word {\n    print \"ok\"\n}\n";
        write(&root.join("net.tools/a.tb"), body);
        write(&root.join("my tools/a.tb"), body);
        write(&root.join("my-tools/a.tb"), body);

        let load = host(root).load(&MetadataIndex::new()).unwrap();
        let groups: Vec<&str> = load.groups.iter().map(|g| g.name()).collect();
        assert_eq!(groups, vec!["my-tools"]);
        assert_eq!(load.groups[0].find("word").unwrap().name(), "word");

        let mut failed: Vec<&str> = load
            .report
            .units
            .iter()
            .filter(|u| u.status == UnitStatus::Failed)
            .map(|u| u.unit.as_str())
            .collect();
        failed.sort();
        assert_eq!(failed, vec!["my tools", "net.tools"]);
        let dotted = load.report.units.iter().find(|u| u.unit == "net.tools").unwrap();
        assert_eq!(
            dotted.error.as_deref(),
            Some("'net.tools' is not a valid group name (use letters, digits, '_' or '-')")
        );
        assert!(dotted.diagnostics.is_empty());
    }

    #[test]
    fn test_is_group_name() {
        assert!(is_group_name("office"));
        assert!(is_group_name("my-tools_2"));
        assert!(!is_group_name("net.tools"));
        assert!(!is_group_name("my tools"));
        assert!(!is_group_name(""));
    }
}
