//! Memoized descriptor lookup.
//!
//! [`MetadataIndex`] is the side table that maps a [`TypeKey`] to the
//! [`CommandDescriptor`] derived from that type's declarative metadata. The
//! first lookup reads the metadata; later lookups return the same `Arc`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::command::Command;
use crate::error::MetadataWarning;
use crate::types::{CommandDescriptor, Metadata, TypeInfo, TypeKey};

/// Process-lifetime descriptor cache, passed explicitly to the catalog and
/// the plugin host.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    descriptors: RwLock<HashMap<TypeKey, Arc<CommandDescriptor>>>,
    warnings: Mutex<Vec<MetadataWarning>>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor of `command`, reading its metadata only on the
    /// first call for `info`.
    pub fn describe(&self, info: &TypeInfo, command: &dyn Command) -> Arc<CommandDescriptor> {
        self.describe_with(info, || command.metadata())
    }

    /// Same as [`describe`](Self::describe) for callers that hold metadata
    /// without a command instance.
    pub fn describe_with(
        &self,
        info: &TypeInfo,
        metadata: impl FnOnce() -> Option<Metadata>,
    ) -> Arc<CommandDescriptor> {
        self.describe_key(info.key(), info, metadata)
    }

    /// Memoizes under `info` qualified by `scope`. Plugin units use their
    /// unit name as scope, so equal type paths in two units stay distinct.
    pub fn describe_scoped(
        &self,
        scope: &str,
        info: &TypeInfo,
        metadata: impl FnOnce() -> Option<Metadata>,
    ) -> Arc<CommandDescriptor> {
        self.describe_key(info.scoped_key(scope), info, metadata)
    }

    fn describe_key(
        &self,
        key: TypeKey,
        info: &TypeInfo,
        metadata: impl FnOnce() -> Option<Metadata>,
    ) -> Arc<CommandDescriptor> {
        if let Some(found) = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(found);
        }

        let descriptor = Arc::new(self.derive(info, &key, metadata()));
        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(descriptors.entry(key).or_insert(descriptor))
    }

    /// Number of memoized descriptors.
    pub fn len(&self) -> usize {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata problems recorded so far.
    pub fn warnings(&self) -> Vec<MetadataWarning> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn derive(&self, info: &TypeInfo, key: &TypeKey, metadata: Option<Metadata>) -> CommandDescriptor {
        let Some(metadata) = metadata else {
            debug!(type_key = %key, "no metadata declared, deriving name from type");
            return CommandDescriptor::bare(info.derived_name());
        };

        let name = match metadata.name.as_deref().map(str::trim) {
            None => info.derived_name(),
            Some(name) if name.is_empty() || name.contains(char::is_whitespace) => {
                self.warn(key, format!("invalid command name '{name}', using type name"));
                info.derived_name()
            }
            Some(name) => name.to_string(),
        };

        let params = metadata
            .params
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let keywords: BTreeSet<String> = metadata
            .keywords
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        CommandDescriptor {
            name,
            description: metadata.description.unwrap_or_default().trim().to_string(),
            params,
            keywords,
            hidden: metadata.hidden,
            rules: metadata.rules,
        }
    }

    fn warn(&self, key: &TypeKey, message: String) {
        warn!(type_key = %key, "{message}");
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MetadataWarning {
                key: key.clone(),
                message,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::ValidationRule;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_missing_metadata_falls_back_to_lowercase_type_name() {
        let index = MetadataIndex::new();
        for type_name in ["Ping", "WinRM", "already_lower", "ÄRGER"] {
            let info = TypeInfo::new("commands", type_name.to_string());
            let descriptor = index.describe_with(&info, || None);
            assert_eq!(descriptor.name, type_name.to_lowercase());
            assert!(descriptor.description.is_empty());
            assert!(descriptor.keywords.is_empty());
            assert!(!descriptor.hidden);
        }
    }

    #[test]
    fn test_describe_is_memoized_per_type() {
        let index = MetadataIndex::new();
        let reads = AtomicUsize::new(0);
        let info = TypeInfo::new("commands", "Sum");

        let first = index.describe_with(&info, || {
            reads.fetch_add(1, Ordering::SeqCst);
            Some(Metadata::named("sum").with_rule(ValidationRule::AllNumeric))
        });
        let second = index.describe_with(&info, || {
            reads.fetch_add(1, Ordering::SeqCst);
            Some(Metadata::named("other"))
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(second.name, "sum");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_same_type_name_in_different_namespaces_is_distinct() {
        let index = MetadataIndex::new();
        let run = index.describe_with(&TypeInfo::new("commands.run", "Ping"), || {
            Some(Metadata::named("ping").with_description("run"))
        });
        let net = index.describe_with(&TypeInfo::new("commands.network", "Ping"), || {
            Some(Metadata::named("ping").with_description("net"))
        });
        assert_eq!(run.description, "run");
        assert_eq!(net.description, "net");
    }

    #[test]
    fn test_scoped_descriptors_do_not_collide() {
        let index = MetadataIndex::new();
        let info = TypeInfo::new("plugins", "Hello");
        let a = index.describe_scoped("a", &info, || Some(Metadata::named("hello")));
        let b = index.describe_scoped("b", &info, || Some(Metadata::named("hey")));
        assert_eq!(a.name, "hello");
        assert_eq!(b.name, "hey");
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_invalid_name_records_warning_and_uses_default() {
        let index = MetadataIndex::new();
        let info = TypeInfo::new("commands", "Broken");
        let descriptor = index.describe_with(&info, || Some(Metadata::named("two words")));
        assert_eq!(descriptor.name, "broken");

        let warnings = index.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("two words"));
    }

    #[test]
    fn test_keywords_are_split_and_lowercased() {
        let index = MetadataIndex::new();
        let info = TypeInfo::new("commands.windows", "Manager");
        let descriptor = index.describe_with(&info, || {
            Some(Metadata::named("manager").with_keywords("Computer  Management"))
        });
        let keywords: Vec<&str> = descriptor.keywords.iter().map(String::as_str).collect();
        assert_eq!(keywords, vec!["computer", "management"]);
    }

    #[test]
    fn test_blank_params_are_dropped() {
        let index = MetadataIndex::new();
        let info = TypeInfo::new("commands", "Hello");
        let descriptor =
            index.describe_with(&info, || Some(Metadata::named("hello").with_params("   ")));
        assert_eq!(descriptor.params, None);
    }
}
