//! Plugin units for `toolbelt`: source scanning, compilation with a
//! content-hash cache, and structural loading into the command catalog.
//!
//! The pipeline for one plugin root:
//!
//! 1. [`PluginHost::discover_units`] lists standalone files and group
//!    directories.
//! 2. [`CompilationCache::compile`] hashes each [`SourceUnit`] and invokes a
//!    [`Compiler`] only when the hash changed.
//! 3. The artifact is registered in a [`ModuleRegistry`] and its command
//!    types are discovered by [`load_module`].
//! 4. [`PluginLoad::merge_into`] adds the commands to a
//!    [`Catalog`](toolbelt_core::Catalog).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use toolbelt_core::{Catalog, MetadataIndex};
//! use toolbelt_plugins::{PluginHost, ScriptCompiler};
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(
//!     dir.path().join("hello.tb"),
//!     "command Hello {\n    print \"hi $1\"\n}\n",
//! ).unwrap();
//!
//! let host = PluginHost::new(dir.path().to_path_buf(), ".cache", "tb", Arc::new(ScriptCompiler));
//! let index = MetadataIndex::new();
//! let load = host.load(&index).unwrap();
//! assert_eq!(load.report.compilations(), 1);
//!
//! let mut catalog = Catalog::new("toolbelt");
//! assert_eq!(load.merge_into(&mut catalog), 1);
//! assert!(catalog.find_command("hello").is_some());
//! ```

mod artifact;
mod cache;
mod compiler;
mod error;
mod host;
mod loader;
mod report;
pub mod script;
mod source;

pub use artifact::{
    Artifact, EXECUTE_SIGNATURE, EntryPoint, FORMAT_VERSION, LoadedModule, ModuleId, ModuleRef,
    ModuleRegistry, Step, TypeDecl,
};
pub use cache::{CacheEntry, CacheOutcome, CacheStats, CacheStatus, CompilationCache};
pub use compiler::{CompileRequest, Compiler, ExternalCompiler, ScriptCompiler};
pub use error::{CacheError, CompileError, Diagnostic, PluginError, UnloadError};
pub use host::{PluginHost, PluginLoad, compiler_from_settings};
pub use loader::{LoadedCommands, ScriptCommand, load_module, qualifies, substitute};
pub use report::{LoadReport, UnitReport, UnitStatus};
pub use source::{
    PreparedSource, REQUIRED_IMPORTS, SourceFile, SourceMap, SourceUnit, UnitKind, UnitLocation,
};
