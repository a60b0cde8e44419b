//! Error types for catalog assembly, services and configuration.
//!
//! Nothing here is fatal to the whole process except a configuration file
//! that exists but cannot be parsed. Metadata problems are recorded as
//! [`MetadataWarning`]s and replaced with safe defaults.

use thiserror::Error;

use crate::types::TypeKey;

/// Configuration file failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A discovered type could not be instantiated; only that type is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{type_name} could not be loaded: {reason}")]
pub struct LoadError {
    pub type_name: String,
    pub reason: String,
}

impl LoadError {
    pub fn new(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

/// A required service was not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("service {0} not found")]
    Missing(&'static str),
}

/// Malformed metadata that was replaced by a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataWarning {
    pub key: TypeKey,
    pub message: String,
}

impl std::fmt::Display for MetadataWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}
