//! Content-hash keyed compilation cache.
//!
//! Layout under the cache directory, per unit:
//!
//! ```text
//! <unit>.artifact   compiled artifact (JSON)
//! <unit>.hash       CacheEntry (JSON): source hash, artifact path, source files
//! ```
//!
//! A stored entry is valid iff its hash equals the SHA-256 of the unit's
//! current file texts. Entries of deleted sources are never purged; deleting
//! the directory forces full recompilation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::compiler::{CompileRequest, Compiler};
use crate::error::CacheError;
use crate::source::{SourceUnit, UnitKind};

/// Unit kind, unit name and content hash.
type MemoKey = (UnitKind, String, String);

/// Persisted record next to a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex SHA-256 of the concatenated source texts.
    pub source_hash: String,
    pub artifact_path: PathBuf,
    pub source_files: Vec<PathBuf>,
    pub cached_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Stored artifact reused.
    Hit,
    /// Compiler invoked.
    Compiled,
}

#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub artifact: Artifact,
    pub status: CacheStatus,
    pub source_hash: String,
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub compilations: usize,
    pub cache_loads: usize,
}

/// Compiles units only when their content hash changed.
///
/// Within one process, `(unit, hash)` pairs are additionally memoized, so a
/// unit is compiled at most once per content even if persisting failed.
pub struct CompilationCache {
    dir: PathBuf,
    compiler: Arc<dyn Compiler>,
    memo: Mutex<HashMap<MemoKey, Artifact>>,
    compilations: AtomicUsize,
    cache_loads: AtomicUsize,
}

impl std::fmt::Debug for CompilationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationCache")
            .field("dir", &self.dir)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl CompilationCache {
    pub fn new(dir: PathBuf, compiler: Arc<dyn Compiler>) -> Self {
        Self {
            dir,
            compiler,
            memo: Mutex::new(HashMap::new()),
            compilations: AtomicUsize::new(0),
            cache_loads: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, unit: &SourceUnit) -> PathBuf {
        unit.cache_file(&self.dir, "artifact")
    }

    pub fn entry_path(&self, unit: &SourceUnit) -> PathBuf {
        unit.cache_file(&self.dir, "hash")
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            compilations: self.compilations.load(Ordering::Relaxed),
            cache_loads: self.cache_loads.load(Ordering::Relaxed),
        }
    }

    /// Returns the artifact for `unit`, compiling only on a hash mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Compile`] when compilation fails. A corrupt or
    /// unreadable stored entry is a miss, not an error.
    pub fn compile(&self, unit: &SourceUnit) -> Result<CacheOutcome, CacheError> {
        let source_hash = unit.content_hash();
        let memo_key = (unit.kind, unit.name.clone(), source_hash.clone());

        if let Some(artifact) = self
            .memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&memo_key)
            .cloned()
        {
            debug!(unit = %unit.name, hash = %source_hash, "in-process cache hit");
            return Ok(self.hit(artifact, source_hash));
        }

        if let Some(artifact) = self.load_stored(unit, &source_hash) {
            self.remember(memo_key, &artifact);
            return Ok(self.hit(artifact, source_hash));
        }

        let prepared = unit.prepare();
        let artifact = self.compiler.compile(&CompileRequest {
            unit,
            prepared: &prepared,
            work_dir: &self.dir,
        })?;
        self.compilations.fetch_add(1, Ordering::Relaxed);
        info!(unit = %unit.name, hash = %source_hash, types = artifact.types.len(), "compiled plugin unit");

        if let Err(err) = self.persist(unit, &source_hash, &artifact) {
            warn!(unit = %unit.name, error = %err, "could not persist compiled artifact");
        }
        self.remember(memo_key, &artifact);

        Ok(CacheOutcome {
            artifact,
            status: CacheStatus::Compiled,
            source_hash,
        })
    }

    fn hit(&self, artifact: Artifact, source_hash: String) -> CacheOutcome {
        self.cache_loads.fetch_add(1, Ordering::Relaxed);
        CacheOutcome {
            artifact,
            status: CacheStatus::Hit,
            source_hash,
        }
    }

    fn remember(&self, key: MemoKey, artifact: &Artifact) {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, artifact.clone());
    }

    fn load_stored(&self, unit: &SourceUnit, source_hash: &str) -> Option<Artifact> {
        let entry_path = self.entry_path(unit);
        let raw = std::fs::read_to_string(&entry_path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(path = %entry_path.display(), error = %err, "corrupt cache entry, recompiling");
                return None;
            }
        };
        if entry.source_hash != source_hash {
            debug!(unit = %unit.name, "source hash changed, recompiling");
            return None;
        }
        match Artifact::read(&entry.artifact_path) {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                debug!(path = %entry.artifact_path.display(), error = %err, "cached artifact unusable, recompiling");
                None
            }
        }
    }

    /// Writes the artifact first, then the entry that vouches for it.
    fn persist(
        &self,
        unit: &SourceUnit,
        source_hash: &str,
        artifact: &Artifact,
    ) -> Result<(), CacheError> {
        let artifact_path = self.artifact_path(unit);
        if let Some(parent) = artifact_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        artifact.write(&artifact_path)?;

        let entry = CacheEntry {
            source_hash: source_hash.to_string(),
            artifact_path,
            source_files: unit.source_paths(),
            cached_at: chrono::Utc::now().to_rfc3339(),
        };
        std::fs::write(self.entry_path(unit), serde_json::to_string_pretty(&entry)?)?;
        Ok(())
    }
}
