//! Command catalog assembly and lookup.
//!
//! Built-in commands are declared in a [`BuiltinRegistry`], the side table
//! that replaces runtime type introspection. Grouping follows a namespace
//! convention: a type in `<root>.G` belongs to group `G`, a type directly in
//! `<root>` is top-level. Types from unrelated namespaces that resolve to
//! the same group name share one logical group.
//!
//! # Examples
//!
//! ```
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use toolbelt_core::*;
//!
//! #[derive(Default)]
//! struct Ping;
//!
//! #[async_trait]
//! impl Command for Ping {
//!     fn metadata(&self) -> Option<Metadata> {
//!         Some(Metadata::named("ping").with_params("<host>"))
//!     }
//!     async fn execute(&self, _: &[String], _: &ServiceContainer, _: &CancellationToken) -> Outcome {
//!         Outcome::success()
//!     }
//! }
//!
//! let mut registry = BuiltinRegistry::new();
//! registry.command::<Ping>("commands.run", "Ping");
//!
//! let index = MetadataIndex::new();
//! let catalog = Catalog::discover(&registry, &index, "toolbelt");
//! let run = catalog.find_group("RUN").unwrap();
//! assert!(run.find("ping").is_some());
//! assert!(catalog.find_command("ping").is_none());
//! ```

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::Command;
use crate::error::LoadError;
use crate::help::HelpService;
use crate::logger::Logger;
use crate::metadata::MetadataIndex;
use crate::services::ServiceContainer;
use crate::types::{
    BUILTIN_ROOT, CommandDescriptor, Metadata, Origin, Outcome, Placement, TypeInfo, eq_ignore_case,
};

/// Type name of group index rows.
pub const GROUP_INDEX_TYPE: &str = "_index";

/// Constructor of a built-in command.
pub type Factory = fn() -> Result<Arc<dyn Command>, LoadError>;

fn default_factory<T: Command + Default + 'static>() -> Result<Arc<dyn Command>, LoadError> {
    Ok(Arc::new(T::default()))
}

/// One built-in command implementation.
#[derive(Clone)]
pub struct Registration {
    pub type_info: TypeInfo,
    factory: Factory,
}

impl Registration {
    pub fn new(type_info: TypeInfo, factory: Factory) -> Self {
        Self { type_info, factory }
    }

    pub fn of<T: Command + Default + 'static>(
        namespace: &'static str,
        type_name: &'static str,
    ) -> Self {
        Self::new(TypeInfo::new(namespace, type_name), default_factory::<T>)
    }

    pub fn instantiate(&self) -> Result<Arc<dyn Command>, LoadError> {
        (self.factory)()
    }

    /// Instantiates and describes the command. A failing constructor is
    /// logged and skipped.
    fn load(&self, index: &MetadataIndex) -> Option<CatalogEntry> {
        match self.instantiate() {
            Ok(command) => Some(CatalogEntry::new(
                self.type_info.clone(),
                command,
                index,
                Origin::Core,
            )),
            Err(err) => {
                warn!(type_name = %self.type_info, error = %err, "skipping command");
                None
            }
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("type_info", &self.type_info)
            .finish_non_exhaustive()
    }
}

/// Metadata describing a group itself (its description and keywords).
#[derive(Debug, Clone)]
pub struct GroupIndex {
    pub namespace: Cow<'static, str>,
    pub metadata: Metadata,
}

/// Explicit registration table of built-in commands and group indexes.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRegistry {
    registrations: Vec<Registration>,
    group_indexes: Vec<GroupIndex>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command<T: Command + Default + 'static>(
        &mut self,
        namespace: &'static str,
        type_name: &'static str,
    ) -> &mut Self {
        self.registrations
            .push(Registration::of::<T>(namespace, type_name));
        self
    }

    pub fn register(&mut self, registration: Registration) -> &mut Self {
        self.registrations.push(registration);
        self
    }

    pub fn group(&mut self, namespace: &'static str, metadata: Metadata) -> &mut Self {
        self.group_indexes.push(GroupIndex {
            namespace: Cow::Borrowed(namespace),
            metadata,
        });
        self
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn group_indexes(&self) -> &[GroupIndex] {
        &self.group_indexes
    }
}

/// A resolvable command with its descriptor.
#[derive(Clone)]
pub struct CatalogEntry {
    pub type_info: TypeInfo,
    pub descriptor: Arc<CommandDescriptor>,
    pub command: Arc<dyn Command>,
    pub origin: Origin,
}

impl CatalogEntry {
    pub fn new(
        type_info: TypeInfo,
        command: Arc<dyn Command>,
        index: &MetadataIndex,
        origin: Origin,
    ) -> Self {
        let descriptor = index.describe(&type_info, command.as_ref());
        Self {
            type_info,
            descriptor,
            command,
            origin,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("type_info", &self.type_info)
            .field("name", &self.descriptor.name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// A named collection of subcommands.
///
/// The group is itself a command: executing it renders help filtered to
/// the group (and to an unmatched subcommand token, if one was given).
#[derive(Debug, Clone)]
pub struct CommandGroup {
    name: String,
    descriptor: Arc<CommandDescriptor>,
    origin: Origin,
    commands: Vec<CatalogEntry>,
}

impl CommandGroup {
    /// Creates an empty group; `name` is case-normalized.
    pub fn new(name: &str, descriptor: Arc<CommandDescriptor>, origin: Origin) -> Self {
        Self {
            name: name.to_lowercase(),
            descriptor,
            origin,
            commands: Vec::new(),
        }
    }

    /// Builds group `name` and populates it by running the namespace
    /// convention over `registry`, scoped to this group.
    pub fn discover(
        name: &str,
        registry: &BuiltinRegistry,
        index: &MetadataIndex,
        root: &str,
    ) -> Self {
        let scoped = |info: &TypeInfo| info.placement(root) == Placement::Group(name.to_lowercase());

        let group_index = registry
            .group_indexes()
            .iter()
            .find(|gi| scoped(&TypeInfo::new(gi.namespace.clone(), GROUP_INDEX_TYPE)));
        let index_info = match group_index {
            Some(gi) => TypeInfo::new(gi.namespace.clone(), GROUP_INDEX_TYPE),
            None => TypeInfo::new(format!("{root}.{name}"), GROUP_INDEX_TYPE),
        };
        let descriptor = index.describe_with(&index_info, || {
            let mut metadata = group_index.map(|gi| gi.metadata.clone()).unwrap_or_default();
            metadata.name = Some(name.to_lowercase());
            Some(metadata)
        });

        let mut group = Self::new(name, descriptor, Origin::Core);
        for registration in registry
            .registrations()
            .iter()
            .filter(|r| scoped(&r.type_info))
        {
            if let Some(entry) = registration.load(index) {
                group.push(entry);
            }
        }
        group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<CommandDescriptor> {
        &self.descriptor
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Subcommands in insertion order.
    pub fn sub_commands(&self) -> &[CatalogEntry] {
        &self.commands
    }

    pub fn find(&self, name: &str) -> Option<&CatalogEntry> {
        self.commands.iter().find(|entry| entry.descriptor.matches(name))
    }

    /// Adds a subcommand; a duplicate name is skipped with a warning.
    pub fn push(&mut self, entry: CatalogEntry) -> bool {
        if self.find(entry.name()).is_some() {
            warn!(
                group = %self.name,
                command = %entry.name(),
                type_name = %entry.type_info,
                "duplicate subcommand name, keeping the first registration"
            );
            return false;
        }
        self.commands.push(entry);
        true
    }

    /// Appends every subcommand of `other`; returns how many were added.
    pub fn append(&mut self, other: CommandGroup) -> usize {
        other
            .commands
            .into_iter()
            .map(|entry| self.push(entry))
            .filter(|added| *added)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    fn write_sub_commands(&self, logger: &dyn Logger) {
        logger.write("Available subcommands:");
        let mut visible: Vec<&CatalogEntry> = self
            .commands
            .iter()
            .filter(|entry| !entry.descriptor.hidden)
            .collect();
        visible.sort_by_key(|entry| entry.name().to_lowercase());
        for entry in visible {
            logger.write(&format!(
                "  {:<15} {}",
                entry.name(),
                entry.descriptor.description
            ));
        }
    }
}

#[async_trait]
impl Command for CommandGroup {
    fn metadata(&self) -> Option<Metadata> {
        Some(Metadata::named(&self.name).with_description(&self.descriptor.description))
    }

    async fn execute(
        &self,
        args: &[String],
        services: &ServiceContainer,
        _cancel: &CancellationToken,
    ) -> Outcome {
        let logger = services.resolve::<dyn Logger>();

        if self.commands.is_empty() {
            if let Some(logger) = &logger {
                logger.warning(&format!("No subcommands found for '{}'.", self.name));
            }
            return Outcome::failure();
        }

        let mut terms = vec![self.name.clone()];
        let mut outcome = Outcome::success();
        if let Some(unknown) = args.first() {
            if let Some(logger) = &logger {
                logger.error(&format!("Unknown subcommand: {unknown}"));
            }
            terms.push(unknown.clone());
            outcome = Outcome::failure();
        }

        let Some(logger) = logger else {
            return outcome;
        };
        match services.resolve::<HelpService>() {
            Some(help) => help.render(&terms, logger.as_ref()),
            None => self.write_sub_commands(logger.as_ref()),
        }
        outcome
    }
}

/// Every resolvable command and group of one process run.
///
/// Built once at startup (built-ins plus the one-time plugin merge) and
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct Catalog {
    program: String,
    groups: BTreeMap<String, CommandGroup>,
    commands: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            groups: BTreeMap::new(),
            commands: Vec::new(),
        }
    }

    /// Discovers built-ins under [`BUILTIN_ROOT`].
    pub fn discover(registry: &BuiltinRegistry, index: &MetadataIndex, program: &str) -> Self {
        Self::discover_under(registry, index, program, BUILTIN_ROOT)
    }

    pub fn discover_under(
        registry: &BuiltinRegistry,
        index: &MetadataIndex,
        program: &str,
        root: &str,
    ) -> Self {
        let mut catalog = Self::new(program);
        let mut group_names = BTreeSet::new();

        for registration in registry.registrations() {
            match registration.type_info.placement(root) {
                Placement::TopLevel => {
                    if let Some(entry) = registration.load(index) {
                        catalog.insert_command(entry);
                    }
                }
                Placement::Group(name) => {
                    group_names.insert(name);
                }
                Placement::Outside => {
                    debug!(type_name = %registration.type_info, root, "outside command root, ignored");
                }
            }
        }

        for gi in registry.group_indexes() {
            if let Placement::Group(name) =
                TypeInfo::new(gi.namespace.clone(), GROUP_INDEX_TYPE).placement(root)
            {
                group_names.insert(name);
            }
        }

        for name in group_names {
            let group = CommandGroup::discover(&name, registry, index, root);
            catalog.merge_group(group);
        }

        debug!(
            commands = catalog.commands.len(),
            groups = catalog.groups.len(),
            "catalog discovered"
        );
        catalog
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Adds a top-level command; a duplicate name is skipped with a warning.
    pub fn insert_command(&mut self, entry: CatalogEntry) -> bool {
        if self.find_command(entry.name()).is_some() {
            warn!(
                command = %entry.name(),
                type_name = %entry.type_info,
                "duplicate command name, keeping the first registration"
            );
            return false;
        }
        self.commands.push(entry);
        true
    }

    /// Inserts `group`, or appends its subcommands to the existing group of
    /// the same name. Returns the number of subcommands added.
    pub fn merge_group(&mut self, group: CommandGroup) -> usize {
        match self.groups.get_mut(group.name()) {
            Some(existing) => existing.append(group),
            None => {
                let added = group.len();
                self.groups.insert(group.name().to_string(), group);
                added
            }
        }
    }

    /// Top-level (ungrouped) command by case-insensitive name.
    pub fn find_command(&self, name: &str) -> Option<&CatalogEntry> {
        self.commands.iter().find(|entry| entry.descriptor.matches(name))
    }

    pub fn find_group(&self, name: &str) -> Option<&CommandGroup> {
        self.groups
            .get(&name.to_lowercase())
            .or_else(|| self.groups.values().find(|g| eq_ignore_case(g.name(), name)))
    }

    /// Top-level commands in insertion order.
    pub fn commands(&self) -> &[CatalogEntry] {
        &self.commands
    }

    /// Groups in alphabetical order.
    pub fn groups(&self) -> impl Iterator<Item = &CommandGroup> {
        self.groups.values()
    }

    /// Total number of leaf commands, grouped or not.
    pub fn command_count(&self) -> usize {
        self.commands.len() + self.groups.values().map(CommandGroup::len).sum::<usize>()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
