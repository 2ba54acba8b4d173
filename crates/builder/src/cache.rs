//! Fingerprint-keyed build cache
//!
//! One entry per package, keyed by ID and guarded by the package
//! fingerprint: a BLAKE3 hash of the serialized descriptor chained with
//! the fingerprints of its dependencies in declared order. Any change to
//! a package or anything upstream of it produces a different fingerprint
//! and forces a rebuild of the whole dependent subtree.

use chrono::{DateTime, Utc};
use picopkg_errors::Error;
use picopkg_hash::Fingerprint;
use picopkg_types::{Overlay, PackageDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// How the recorded run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    Succeeded,
    Failed,
}

/// The latest recorded result for one package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub outcome: CacheOutcome,
    pub recorded_at: DateTime<Utc>,
    /// Finalized overlay, replayed on a hit so dependents can resolve
    /// variables against the cached package
    #[serde(default)]
    pub overlay: Overlay,
}

impl CacheEntry {
    #[must_use]
    pub fn succeeded(fingerprint: Fingerprint, overlay: Overlay) -> Self {
        Self {
            fingerprint,
            outcome: CacheOutcome::Succeeded,
            recorded_at: Utc::now(),
            overlay,
        }
    }

    #[must_use]
    pub fn failed(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            outcome: CacheOutcome::Failed,
            recorded_at: Utc::now(),
            overlay: Overlay::new(),
        }
    }
}

/// JSON-persisted cache of per-package build results
#[derive(Debug)]
pub struct BuildCache {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl BuildCache {
    /// Cache that lives only for this process
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Load a cache file, starting empty when the file does not exist
    ///
    /// # Errors
    ///
    /// I/O errors other than a missing file, or a JSON parse failure.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let entries = match tokio::fs::read(path).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::io_with_path(&e, path)),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
        })
    }

    /// Write the cache back to its file, if it has one
    ///
    /// # Errors
    ///
    /// I/O errors from writing the file.
    pub async fn save(&self) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = serde_json::to_vec_pretty(&*self.locked())?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        tokio::fs::write(path, data)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        Ok(())
    }

    /// The recorded entry for a package, only when its fingerprint still
    /// matches
    #[must_use]
    pub fn lookup(&self, id: &str, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.locked()
            .get(id)
            .filter(|entry| &entry.fingerprint == fingerprint)
            .cloned()
    }

    /// Record the latest result for a package, replacing any earlier entry
    pub fn record(&self, id: &str, entry: CacheEntry) {
        self.locked().insert(id.to_string(), entry);
    }

    fn locked(&self) -> MutexGuard<'_, BTreeMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Fingerprint a package from its descriptor and resolved dependency
/// fingerprints
///
/// # Errors
///
/// Serialization failure of the descriptor (not expected for valid data).
pub fn package_fingerprint(
    descriptor: &PackageDescriptor,
    dependency_fingerprints: &[Fingerprint],
) -> Result<Fingerprint, Error> {
    let bytes = serde_json::to_vec(descriptor)?;
    Ok(Fingerprint::for_package(&bytes, dependency_fingerprints))
}
