//! Run-wide and per-package execution contexts
//!
//! `RunContext` owns everything packages share across a run: the `persist`
//! namespace and the finalized metadata overlays of completed packages.
//! `PackageContext` is the view a single pipeline sees - its own metadata,
//! the shared persist namespace, and the overlays of its direct
//! dependencies only. Cross-package reads outside `depends` are impossible
//! by construction.

use picopkg_errors::{Error, VariableError};
use picopkg_types::{Overlay, PackageDescriptor};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Overlay key holding a package's finalized metadata map
pub(crate) const OVERLAY_METADATA: &str = "metadata";
/// Overlay key holding a package's resolved environment map
pub(crate) const OVERLAY_ENV: &str = "env";
/// Overlay key holding persist-namespace writes made by a package
pub(crate) const OVERLAY_PERSIST: &str = "persist";

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Shared state for one build run
#[derive(Debug, Default)]
pub struct RunContext {
    persist: Arc<Mutex<Overlay>>,
    overlays: Mutex<BTreeMap<String, Arc<Overlay>>>,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the finalized overlay of a completed package
    pub fn finalize(&self, id: &str, overlay: Overlay) {
        locked(&self.overlays).insert(id.to_string(), Arc::new(overlay));
    }

    /// Re-apply a cached package's overlay: persist writes recorded in the
    /// entry land back in the live persist namespace, and the overlay
    /// becomes visible to dependents exactly as a fresh build's would
    pub fn replay(&self, id: &str, overlay: Overlay) {
        if let Some(Value::Object(writes)) = overlay.get(OVERLAY_PERSIST) {
            let mut persist = locked(&self.persist);
            for (key, value) in writes {
                persist.insert(key.clone(), value.clone());
            }
        }
        self.finalize(id, overlay);
    }

    /// Finalized overlay of a package, if it reached a satisfied state
    #[must_use]
    pub fn overlay(&self, id: &str) -> Option<Arc<Overlay>> {
        locked(&self.overlays).get(id).cloned()
    }

    /// Snapshot of the persist namespace, for post-run inspection
    #[must_use]
    pub fn persist_snapshot(&self) -> Overlay {
        locked(&self.persist).clone()
    }

    fn persist_handle(&self) -> Arc<Mutex<Overlay>> {
        Arc::clone(&self.persist)
    }
}

/// Execution view for one package's pipeline
///
/// Holds the mutable metadata (descriptor values plus anything built-ins
/// compute), a handle on the shared persist namespace, and a snapshot of
/// the finalized overlays of the package's direct dependencies.
#[derive(Debug)]
pub struct PackageContext {
    id: String,
    metadata: Overlay,
    persist: Arc<Mutex<Overlay>>,
    persist_writes: Overlay,
    deps: BTreeMap<String, Arc<Overlay>>,
}

impl PackageContext {
    /// Build the context for a fresh pipeline run
    ///
    /// # Errors
    ///
    /// Internal error if a declared dependency has no finalized overlay;
    /// the wave ordering guarantees dependencies finish first, so this
    /// only fires on a scheduler bug.
    pub fn new(descriptor: &PackageDescriptor, run: &RunContext) -> Result<Self, Error> {
        Self::with_metadata(&descriptor.id, descriptor.metadata.clone(), &descriptor.depends, run)
    }

    /// Build a context over pre-existing metadata (used when replaying a
    /// cached package's `always` actions)
    ///
    /// # Errors
    ///
    /// Same as [`PackageContext::new`].
    pub fn with_metadata(
        id: &str,
        metadata: Overlay,
        depends: &[String],
        run: &RunContext,
    ) -> Result<Self, Error> {
        let mut deps = BTreeMap::new();
        for dep in depends {
            let overlay = run.overlay(dep).ok_or_else(|| {
                Error::internal(format!("dependency {dep} of {id} has no finalized overlay"))
            })?;
            deps.insert(dep.clone(), overlay);
        }
        Ok(Self {
            id: id.to_string(),
            metadata,
            persist: run.persist_handle(),
            persist_writes: Overlay::new(),
            deps,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Write a computed metadata value
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Current metadata value for a plain (non-dotted) key, as a string
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata.get(key).map(value_to_string)
    }

    /// Write into the shared persist namespace, tracking the write so it
    /// can be recorded in the package's cache entry
    pub fn set_persist(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        locked(&self.persist).insert(key.clone(), value.clone());
        self.persist_writes.insert(key, value);
    }

    /// Resolve one `{scope.path}` reference to its string value
    ///
    /// Scopes are `metadata` (this package), `persist` (run-wide), or the
    /// ID of a direct dependency whose path then walks its finalized
    /// overlay. A missing path fails; a null or empty leaf resolves to "".
    ///
    /// # Errors
    ///
    /// `VariableError::UnresolvedVariable` for a missing path or malformed
    /// reference; `VariableError::UndeclaredDependency` when the scope is
    /// a package ID outside `depends`.
    pub fn resolve_reference(&self, reference: &str) -> Result<String, Error> {
        let Some((scope, path)) = reference.split_once('.') else {
            return Err(self.unresolved(reference));
        };

        let value = match scope {
            "metadata" => walk_map(&self.metadata, path),
            "persist" => walk_map(&locked(&self.persist), path),
            dep => {
                let Some(overlay) = self.deps.get(dep) else {
                    return Err(VariableError::UndeclaredDependency {
                        package: self.id.clone(),
                        scope: dep.to_string(),
                    }
                    .into());
                };
                walk_map(overlay, path)
            }
        };

        value.map(|v| value_to_string(&v)).ok_or_else(|| self.unresolved(reference))
    }

    /// Resolved environment map of a direct dependency's overlay
    #[must_use]
    pub fn dependency_env(&self, dep: &str) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(Value::Object(map)) = self.deps.get(dep).and_then(|o| o.get(OVERLAY_ENV)) {
            for (key, value) in map {
                env.insert(key.clone(), value_to_string(value));
            }
        }
        env
    }

    /// Collapse into the finalized overlay dependents and the cache see
    #[must_use]
    pub fn into_overlay(self, env: BTreeMap<String, String>) -> Overlay {
        let mut overlay = Overlay::new();
        overlay.insert(
            OVERLAY_METADATA.to_string(),
            Value::Object(self.metadata.into_iter().collect()),
        );
        overlay.insert(
            OVERLAY_ENV.to_string(),
            Value::Object(env.into_iter().map(|(k, v)| (k, Value::String(v))).collect()),
        );
        overlay.insert(
            OVERLAY_PERSIST.to_string(),
            Value::Object(self.persist_writes.into_iter().collect()),
        );
        overlay
    }

    fn unresolved(&self, reference: &str) -> Error {
        VariableError::UnresolvedVariable {
            package: self.id.clone(),
            reference: reference.to_string(),
        }
        .into()
    }
}

/// Walk a dotted path through nested JSON objects rooted at an overlay map
fn walk_map(root: &Overlay, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = root.get(first)?.clone();
    for segment in segments {
        let Value::Object(map) = current else {
            return None;
        };
        current = map.get(segment)?.clone();
    }
    Some(current)
}

/// Stringify a leaf value: strings verbatim, null as "", scalars via
/// their JSON rendering
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run_with_dep(dep_id: &str, metadata: Value) -> RunContext {
        let run = RunContext::new();
        let mut overlay = Overlay::new();
        overlay.insert(OVERLAY_METADATA.to_string(), metadata);
        overlay.insert(OVERLAY_ENV.to_string(), json!({"CFLAGS": "-O2"}));
        run.finalize(dep_id, overlay);
        run
    }

    #[test]
    fn metadata_scope_resolves_own_values() {
        let run = RunContext::new();
        let mut descriptor = PackageDescriptor::new("app");
        descriptor.metadata.insert("name".into(), json!("app-1.0"));
        let ctx = PackageContext::new(&descriptor, &run).unwrap();

        assert_eq!(ctx.resolve_reference("metadata.name").unwrap(), "app-1.0");
    }

    #[test]
    fn null_leaf_resolves_to_empty_string() {
        let run = RunContext::new();
        let mut descriptor = PackageDescriptor::new("app");
        descriptor.metadata.insert("sha256".into(), Value::Null);
        let ctx = PackageContext::new(&descriptor, &run).unwrap();

        assert_eq!(ctx.resolve_reference("metadata.sha256").unwrap(), "");
    }

    #[test]
    fn missing_path_is_unresolved() {
        let run = RunContext::new();
        let descriptor = PackageDescriptor::new("app");
        let ctx = PackageContext::new(&descriptor, &run).unwrap();

        let err = ctx.resolve_reference("metadata.nope").unwrap_err();
        assert!(matches!(
            err,
            Error::Variable(VariableError::UnresolvedVariable { .. })
        ));
    }

    #[test]
    fn dependency_scope_reads_finalized_overlay() {
        let run = run_with_dep("icu", json!({"prefix": "/opt/icu"}));
        let mut descriptor = PackageDescriptor::new("boost");
        descriptor.depends.push("icu".into());
        let ctx = PackageContext::new(&descriptor, &run).unwrap();

        assert_eq!(
            ctx.resolve_reference("icu.metadata.prefix").unwrap(),
            "/opt/icu"
        );
        assert_eq!(ctx.dependency_env("icu")["CFLAGS"], "-O2");
    }

    #[test]
    fn undeclared_dependency_scope_is_rejected() {
        let run = run_with_dep("icu", json!({}));
        let descriptor = PackageDescriptor::new("boost");
        let ctx = PackageContext::new(&descriptor, &run).unwrap();

        let err = ctx.resolve_reference("icu.metadata.prefix").unwrap_err();
        assert!(matches!(
            err,
            Error::Variable(VariableError::UndeclaredDependency { ref scope, .. })
                if scope == "icu"
        ));
    }

    #[test]
    fn persist_writes_are_shared_and_tracked() {
        let run = RunContext::new();
        let descriptor = PackageDescriptor::new("a");
        let mut ctx = PackageContext::new(&descriptor, &run).unwrap();
        ctx.set_persist("saved_archive", json!("/tmp/a.tar.gz"));

        // Visible to a later package through the shared namespace
        let other = PackageContext::new(&PackageDescriptor::new("b"), &run).unwrap();
        assert_eq!(
            other.resolve_reference("persist.saved_archive").unwrap(),
            "/tmp/a.tar.gz"
        );

        // And recorded in the finalized overlay for cache replay
        let overlay = ctx.into_overlay(BTreeMap::new());
        assert_eq!(
            overlay[OVERLAY_PERSIST]["saved_archive"],
            json!("/tmp/a.tar.gz")
        );
    }

    #[test]
    fn replay_reapplies_persist_writes() {
        let run = RunContext::new();
        let mut overlay = Overlay::new();
        overlay.insert(OVERLAY_METADATA.to_string(), json!({}));
        overlay.insert(OVERLAY_PERSIST.to_string(), json!({"key": "value"}));
        run.replay("cached", overlay);

        let ctx = PackageContext::new(&PackageDescriptor::new("next"), &run).unwrap();
        assert_eq!(ctx.resolve_reference("persist.key").unwrap(), "value");
    }
}
