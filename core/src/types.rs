//! Type definitions shared by the catalog, router and plugin host.
//!
//! A command implementation is identified by its [`TypeInfo`] (a dotted
//! namespace plus a type name). Declarative [`Metadata`] attached to that
//! implementation is turned into an immutable [`CommandDescriptor`] by the
//! [`MetadataIndex`](crate::MetadataIndex).

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::validate::{ValidationError, ValidationRule, validate_args};

/// Program name used as the usage prefix when none is configured.
pub const DEFAULT_PROGRAM: &str = "toolbelt";

/// Namespace root of built-in commands.
pub const BUILTIN_ROOT: &str = "commands";

/// Namespace root of plugin commands.
pub const PLUGIN_ROOT: &str = "plugins";

/// Case-insensitive comparison used for every name lookup.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

/// Stable identity of one command implementation.
///
/// Built-in commands use `'static` strings so registrations can be written
/// as plain data; plugin commands carry owned strings read from artifacts.
///
/// # Examples
///
/// ```
/// use toolbelt_core::{Placement, TypeInfo};
///
/// let ping = TypeInfo::new("commands.run", "Ping");
/// assert_eq!(ping.key().as_str(), "commands.run::Ping");
/// assert_eq!(ping.placement("commands"), Placement::Group("run".into()));
///
/// let sum = TypeInfo::new("commands", "Sum");
/// assert_eq!(sum.placement("commands"), Placement::TopLevel);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Dotted namespace path (e.g. `commands.run`).
    pub namespace: Cow<'static, str>,
    /// Type name inside the namespace (e.g. `Ping`).
    pub type_name: Cow<'static, str>,
}

/// Key under which descriptors are memoized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(String);

impl TypeKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a type lands relative to a namespace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Namespace equals the root: an ungrouped command.
    TopLevel,
    /// Namespace has at least one segment beyond the root; carries the
    /// lower-cased last segment.
    Group(String),
    /// Namespace is not under the root at all.
    Outside,
}

impl TypeInfo {
    pub fn new(
        namespace: impl Into<Cow<'static, str>>,
        type_name: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
        }
    }

    pub fn key(&self) -> TypeKey {
        TypeKey(format!("{}::{}", self.namespace, self.type_name))
    }

    /// Key qualified by the unit that defines the type.
    pub fn scoped_key(&self, scope: &str) -> TypeKey {
        TypeKey(format!("{scope}/{}::{}", self.namespace, self.type_name))
    }

    /// Lower-cased type name, the fallback command name.
    pub fn derived_name(&self) -> String {
        self.type_name.to_lowercase()
    }

    /// Classifies this type's namespace against `root`.
    ///
    /// The group name is the last namespace segment, lower-cased. Segment
    /// comparison against the root is case-insensitive.
    pub fn placement(&self, root: &str) -> Placement {
        let segments: Vec<&str> = self
            .namespace
            .split('.')
            .filter(|s| !s.is_empty())
            .collect();
        let root_segments: Vec<&str> = root.split('.').filter(|s| !s.is_empty()).collect();

        if segments.len() < root_segments.len()
            || !segments
                .iter()
                .zip(&root_segments)
                .all(|(a, b)| eq_ignore_case(a, b))
        {
            return Placement::Outside;
        }

        match segments.get(root_segments.len()..) {
            Some([]) | None => Placement::TopLevel,
            Some(rest) => match rest.last() {
                Some(last) => Placement::Group(last.to_lowercase()),
                None => Placement::TopLevel,
            },
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.type_name)
    }
}

/// Declarative metadata attached to a command implementation.
///
/// Every field is optional; missing values fall back to defaults when the
/// descriptor is derived.
///
/// # Examples
///
/// ```
/// use toolbelt_core::{Metadata, ValidationRule};
///
/// let meta = Metadata::named("sum")
///     .with_description("Adds the specified numbers")
///     .with_params("<number1> <number2> ...")
///     .with_rule(ValidationRule::MinCount(1))
///     .with_rule(ValidationRule::AllNumeric);
/// assert_eq!(meta.rules.len(), 2);
/// assert!(!meta.hidden);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Usage parameter template such as `<host1> <host2> ...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
    /// Whitespace separated search keywords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ValidationRule>,
}

impl Metadata {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_params(mut self, params: &str) -> Self {
        self.params = Some(params.to_string());
        self
    }

    pub fn with_keywords(mut self, keywords: &str) -> Self {
        self.keywords = Some(keywords.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Immutable metadata record derived once per implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    pub params: Option<String>,
    pub keywords: BTreeSet<String>,
    pub hidden: bool,
    pub rules: Vec<ValidationRule>,
}

impl CommandDescriptor {
    /// Descriptor with only a name, used when no metadata is present.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            params: None,
            keywords: BTreeSet::new(),
            hidden: false,
            rules: Vec::new(),
        }
    }

    /// Case-insensitive exact name comparison. Keywords never match here.
    pub fn matches(&self, name: &str) -> bool {
        eq_ignore_case(&self.name, name)
    }

    /// Renders `<program> [group] <name> [params]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use toolbelt_core::CommandDescriptor;
    ///
    /// let mut ping = CommandDescriptor::bare("ping");
    /// assert_eq!(ping.usage("toolbelt", Some("run")), "toolbelt run ping");
    /// ping.params = Some("<host>".into());
    /// assert_eq!(ping.usage("toolbelt", None), "toolbelt ping <host>");
    /// ```
    pub fn usage(&self, program: &str, group: Option<&str>) -> String {
        let mut usage = String::from(program);
        if let Some(group) = group {
            usage.push(' ');
            usage.push_str(group);
        }
        usage.push(' ');
        usage.push_str(&self.name);
        if let Some(params) = self.params.as_deref() {
            usage.push(' ');
            usage.push_str(params);
        }
        usage
    }

    /// Text matched by search terms: the name followed by the keywords.
    pub fn search_text(&self) -> String {
        let mut text = self.name.to_lowercase();
        for keyword in &self.keywords {
            text.push(' ');
            text.push_str(keyword);
        }
        text
    }

    /// Runs the declared rules in order; the first failure wins.
    pub fn validate(&self, args: &[String]) -> Result<(), ValidationError> {
        validate_args(&self.rules, args)
    }
}

/// Whether a catalog entry was built in or loaded from a plugin unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Core,
    Plugin,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => write!(f, "Core"),
            Self::Plugin => write!(f, "Plugin"),
        }
    }
}

/// Success or failure reported by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

/// Result of one command execution.
///
/// # Examples
///
/// ```
/// use toolbelt_core::Outcome;
///
/// assert!(Outcome::from_exit_code(0).is_success());
/// let failed = Outcome::from_exit_code(3);
/// assert!(!failed.is_success());
/// assert_eq!(failed.exit_code, Some(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub exit_code: Option<i32>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            exit_code: None,
        }
    }

    pub fn failure() -> Self {
        Self {
            status: Status::Failure,
            exit_code: None,
        }
    }

    pub fn from_exit_code(code: i32) -> Self {
        Self {
            status: if code == 0 {
                Status::Success
            } else {
                Status::Failure
            },
            exit_code: Some(code),
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Process exit code: the explicit code, else 0/1 from the status.
    pub fn process_code(&self) -> i32 {
        self.exit_code.unwrap_or(match self.status {
            Status::Success => 0,
            Status::Failure => 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_top_level_and_groups() {
        let top = TypeInfo::new("commands", "Sum");
        assert_eq!(top.placement("commands"), Placement::TopLevel);

        let grouped = TypeInfo::new("Commands.Run", "Ping");
        assert_eq!(grouped.placement("commands"), Placement::Group("run".into()));

        let nested = TypeInfo::new("commands.tools.Run", "Test1");
        assert_eq!(nested.placement("commands"), Placement::Group("run".into()));

        let outside = TypeInfo::new("support", "Helper");
        assert_eq!(outside.placement("commands"), Placement::Outside);
    }

    #[test]
    fn test_placement_with_multi_segment_root() {
        let info = TypeInfo::new("app.commands.net", "Ping");
        assert_eq!(info.placement("app.commands"), Placement::Group("net".into()));
        assert_eq!(
            TypeInfo::new("app.commands", "Sum").placement("app.commands"),
            Placement::TopLevel
        );
        assert_eq!(
            TypeInfo::new("app", "Sum").placement("app.commands"),
            Placement::Outside
        );
    }

    #[test]
    fn test_descriptor_matches_is_case_insensitive() {
        let descriptor = CommandDescriptor::bare("Ping");
        assert!(descriptor.matches("ping"));
        assert!(descriptor.matches("PING"));
        assert!(!descriptor.matches("pin"));
    }

    #[test]
    fn test_search_text_appends_keywords() {
        let mut descriptor = CommandDescriptor::bare("Manager");
        descriptor.keywords.insert("computer".into());
        descriptor.keywords.insert("management".into());
        assert_eq!(descriptor.search_text(), "manager computer management");
    }

    #[test]
    fn test_outcome_process_code() {
        assert_eq!(Outcome::success().process_code(), 0);
        assert_eq!(Outcome::failure().process_code(), 1);
        assert_eq!(Outcome::failure().with_exit_code(4).process_code(), 4);
    }
}
