//! Compiled artifacts and loaded module handles.
//!
//! An [`Artifact`] is the JSON output of a [`Compiler`](crate::Compiler):
//! the type declarations of one unit. Loading it yields a [`ModuleRef`]
//! registered in a [`ModuleRegistry`], which only keeps a `Weak` back
//! reference. Commands hold the strong references; a module can be
//! explicitly unloaded once none remain.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tracing::debug;

use toolbelt_core::Metadata;

use crate::error::{CacheError, UnloadError};

/// Current artifact layout version.
pub const FORMAT_VERSION: u32 = 1;

/// Signature a type's entry point must have to be discovered as a command.
pub const EXECUTE_SIGNATURE: &str = "execute(args: [string]) -> outcome";

/// One action of a script command body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Print { text: String },
    Success { text: String },
    Warn { text: String },
    Error { text: String },
    Exec { program: String, args: Vec<String> },
    Exit { code: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub signature: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl EntryPoint {
    pub fn execute(steps: Vec<Step>) -> Self {
        Self {
            signature: EXECUTE_SIGNATURE.to_string(),
            steps,
        }
    }
}

/// A type declared in a plugin unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub type_name: String,
    pub namespace: String,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub format_version: u32,
    pub unit: String,
    pub types: Vec<TypeDecl>,
}

impl Artifact {
    pub fn new(unit: &str, types: Vec<TypeDecl>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            unit: unit.to_string(),
            types,
        }
    }

    /// Reads and version-checks an artifact file.
    pub fn read(path: &Path) -> Result<Self, CacheError> {
        let raw = std::fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&raw)?;
        if artifact.format_version != FORMAT_VERSION {
            return Err(CacheError::UnsupportedFormat(artifact.format_version));
        }
        Ok(artifact)
    }

    pub fn write(&self, path: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Identity of one registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A loaded artifact.
#[derive(Debug)]
pub struct LoadedModule {
    pub id: ModuleId,
    /// Per-unit load counter, starting at 1.
    pub generation: u64,
    pub artifact: Artifact,
}

/// Strong handle to a loaded module, held by every command it provides.
#[derive(Debug, Clone)]
pub struct ModuleRef(Arc<LoadedModule>);

impl Deref for ModuleRef {
    type Target = LoadedModule;

    fn deref(&self) -> &LoadedModule {
        &self.0
    }
}

#[derive(Debug)]
struct Slot {
    unit: String,
    module: Weak<LoadedModule>,
}

/// Bookkeeping of loaded modules. Holds no strong references.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    next_id: AtomicU64,
    slots: Mutex<HashMap<ModuleId, Slot>>,
    generations: Mutex<HashMap<String, u64>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, artifact: Artifact) -> ModuleRef {
        let id = ModuleId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let generation = {
            let mut generations = self
                .generations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let counter = generations.entry(artifact.unit.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        let unit = artifact.unit.clone();
        let module = Arc::new(LoadedModule {
            id,
            generation,
            artifact,
        });
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Slot {
                    unit: unit.clone(),
                    module: Arc::downgrade(&module),
                },
            );
        debug!(module = %id, unit = %unit, generation, "module registered");
        ModuleRef(module)
    }

    /// Live strong references to `id`, or `None` if it is not registered.
    pub fn live_references(&self, id: ModuleId) -> Option<usize> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|slot| slot.module.strong_count())
    }

    /// Removes `id` once no command references it anymore.
    pub fn unload(&self, id: ModuleId) -> Result<(), UnloadError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get(&id).ok_or(UnloadError::Unknown(id))?;
        match slot.module.strong_count() {
            0 => {
                debug!(module = %id, unit = %slot.unit, "module unloaded");
                slots.remove(&id);
                Ok(())
            }
            n => Err(UnloadError::InUse(n)),
        }
    }

    /// Registered modules of `unit`, oldest first.
    pub fn modules_of(&self, unit: &str) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, slot)| slot.unit == unit)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of times `unit` has been loaded in this process.
    pub fn generation(&self, unit: &str) -> u64 {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(unit)
            .copied()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(unit: &str) -> Artifact {
        Artifact::new(
            unit,
            vec![TypeDecl {
                type_name: "Hello".into(),
                namespace: "plugins".into(),
                is_abstract: false,
                metadata: Some(Metadata::named("hello")),
                entry: Some(EntryPoint::execute(vec![Step::Print {
                    text: "hi $1".into(),
                }])),
            }],
        )
    }

    #[test]
    fn test_artifact_file_roundtrip_and_version_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.artifact");
        artifact("hello").write(&path).unwrap();
        assert_eq!(Artifact::read(&path).unwrap(), artifact("hello"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"op\": \"print\""));
        std::fs::write(&path, raw.replace("\"format_version\": 1", "\"format_version\": 9")).unwrap();
        assert!(matches!(
            Artifact::read(&path),
            Err(CacheError::UnsupportedFormat(9))
        ));
    }

    #[test]
    fn test_unload_refused_while_referenced() {
        let registry = ModuleRegistry::new();
        let module = registry.register(artifact("hello"));
        let id = module.id;
        let held = module.clone();

        assert_eq!(registry.live_references(id), Some(2));
        assert_eq!(registry.unload(id), Err(UnloadError::InUse(2)));

        drop(module);
        drop(held);
        assert_eq!(registry.live_references(id), Some(0));
        assert_eq!(registry.unload(id), Ok(()));
        assert_eq!(registry.unload(id), Err(UnloadError::Unknown(id)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_generation_counts_loads_per_unit() {
        let registry = ModuleRegistry::new();
        let first = registry.register(artifact("hello"));
        let second = registry.register(artifact("hello"));
        let other = registry.register(artifact("other"));
        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(other.generation, 1);
        assert_ne!(first.id, second.id);
        assert_eq!(registry.generation("hello"), 2);
        assert_eq!(registry.generation("missing"), 0);
        assert_eq!(registry.modules_of("hello"), vec![first.id, second.id]);
    }
}
