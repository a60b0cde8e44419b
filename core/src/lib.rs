//! Command catalog, routing and help search for `toolbelt`.
//!
//! This crate holds everything the runtime needs between "a set of command
//! implementations" and "one executed command":
//!
//! - [`MetadataIndex`] turns declarative [`Metadata`] into memoized
//!   [`CommandDescriptor`]s.
//! - [`ValidationRule`]s check the argument shape before a command runs.
//! - [`Catalog`] groups commands by namespace convention, from a
//!   [`BuiltinRegistry`] side table plus merged plugin groups.
//! - [`Router`] resolves `[group] <command> [args...]` and falls back to
//!   [`HelpService`], which filters the listing with [`search`].
//! - [`ServiceContainer`] hands shared services such as the [`Logger`] to
//!   commands.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use toolbelt_core::*;
//!
//! #[derive(Default)]
//! struct Sum;
//!
//! #[async_trait]
//! impl Command for Sum {
//!     fn metadata(&self) -> Option<Metadata> {
//!         Some(Metadata::named("sum").with_rule(ValidationRule::AllNumeric))
//!     }
//!     async fn execute(&self, _: &[String], _: &ServiceContainer, _: &CancellationToken) -> Outcome {
//!         Outcome::success()
//!     }
//! }
//!
//! let mut registry = BuiltinRegistry::new();
//! registry.command::<Sum>("commands", "Sum");
//! let index = MetadataIndex::new();
//! let router = Router::new(Arc::new(Catalog::discover(&registry, &index, "toolbelt")));
//!
//! let args = vec!["SUM".to_string(), "1".to_string()];
//! assert!(matches!(router.resolve(&args), Some(Invocation::Command { .. })));
//! ```

mod catalog;
mod command;
mod config;
mod error;
mod help;
mod logger;
mod metadata;
mod router;
pub mod search;
mod services;
mod types;
mod validate;

pub use catalog::{
    BuiltinRegistry, Catalog, CatalogEntry, CommandGroup, Factory, GROUP_INDEX_TYPE, GroupIndex,
    Registration,
};
pub use command::Command;
pub use config::{
    CONFIG_FILE_NAME, CompilerKind, CompilerSettings, HelpSettings, PluginSettings, RuntimeConfig,
};
pub use error::{ConfigError, LoadError, MetadataWarning, ServiceError};
pub use help::{HelpCommand, HelpService};
pub use logger::{ConsoleLogger, LogLine, Logger, RecordingLogger, Severity};
pub use metadata::MetadataIndex;
pub use router::{CANCELLED_EXIT_CODE, Confirm, Dispatch, Invocation, Router};
pub use search::{Candidate, Score, SearchIndex, SearchResult};
pub use services::ServiceContainer;
pub use types::{
    BUILTIN_ROOT, CommandDescriptor, DEFAULT_PROGRAM, Metadata, Origin, Outcome, PLUGIN_ROOT,
    Placement, Status, TypeInfo, TypeKey, eq_ignore_case,
};
pub use validate::{ValidationError, ValidationRule, validate_args};
