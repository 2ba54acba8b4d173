//! Engine-implemented pipeline steps
//!
//! A step whose name carries the `picopkg.` prefix dispatches here instead
//! of going to the shell. Option values are templates and resolve against
//! the package context before the built-in runs.

use crate::context::PackageContext;
use crate::extract::extract_archive;
use crate::source::{self, AcquiredSource};
use crate::vars;
use picopkg_errors::{BuildError, Error, SourceError};
use picopkg_events::EventSender;
use picopkg_net::NetClient;
use picopkg_types::{PackageDescriptor, SourceOption};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Everything a built-in may touch while it runs
pub struct StepScope<'a> {
    pub descriptor: &'a PackageDescriptor,
    pub ctx: &'a mut PackageContext,
    /// Package work root; relative paths in options land under it
    pub work_dir: &'a Path,
    /// Working directory for subsequent shell steps
    pub cwd: &'a mut PathBuf,
    /// Set by `picopkg.download`, checked again by the verify stage
    pub acquired: &'a mut Option<AcquiredSource>,
    pub net: &'a NetClient,
    pub tx: &'a EventSender,
}

/// Dispatch a built-in step by name
///
/// # Errors
///
/// `BuildError::UnknownBuiltin` for an unregistered name, plus whatever
/// the built-in itself reports.
pub async fn run_builtin(
    name: &str,
    options: &BTreeMap<String, Value>,
    scope: &mut StepScope<'_>,
) -> Result<(), Error> {
    let options = vars::resolve_options(options, scope.ctx)?;
    match name {
        "picopkg.download" => download(&options, scope).await,
        "picopkg.extract" => extract(&options, scope).await,
        "picopkg.make_folder" => make_folder(&options, scope).await,
        "picopkg.set" => set(&options, scope),
        "picopkg.cd" => cd(&options, scope),
        other => Err(BuildError::UnknownBuiltin {
            name: other.to_string(),
        }
        .into()),
    }
}

/// Acquire and verify the package's source archive, then record its path
/// in the persist namespace (key `saved_archive`, or the `save_to` option)
async fn download(
    options: &BTreeMap<String, Value>,
    scope: &mut StepScope<'_>,
) -> Result<(), Error> {
    let resolved = resolve_sources(&scope.descriptor.sources, scope.ctx)?;
    let acquired = source::acquire(
        scope.ctx.id(),
        &resolved,
        &scope.work_dir.join("downloads"),
        scope.net,
        scope.tx,
    )
    .await?;

    let key = optional_str(options, "save_to").unwrap_or_else(|| "saved_archive".to_string());
    scope.ctx.set_persist(
        key,
        Value::String(acquired.path.display().to_string()),
    );
    *scope.acquired = Some(acquired);
    Ok(())
}

/// Unpack the acquired archive (or the `archive` option) into the package
/// work area and point the working directory at the extracted tree
async fn extract(
    options: &BTreeMap<String, Value>,
    scope: &mut StepScope<'_>,
) -> Result<(), Error> {
    let archive = match optional_str(options, "archive") {
        Some(path) => PathBuf::from(path),
        None => scope
            .acquired
            .as_ref()
            .map(|a| a.path.clone())
            .ok_or_else(|| SourceError::NoSavedArchive {
                package: scope.ctx.id().to_string(),
            })?,
    };

    let dest = match optional_str(options, "to") {
        Some(path) => absolute_under(scope.work_dir, &path),
        None => scope.work_dir.join("src"),
    };
    extract_archive(&archive, &dest).await?;

    // Shell steps run inside the extracted tree from here on.
    *scope.cwd = match scope.ctx.metadata_str("source_folder") {
        Some(folder) if !folder.is_empty() => dest.join(folder),
        _ => dest,
    };
    Ok(())
}

/// Create a directory and optionally publish its absolute path as a
/// metadata value, the usual way a package establishes its `prefix`
async fn make_folder(
    options: &BTreeMap<String, Value>,
    scope: &mut StepScope<'_>,
) -> Result<(), Error> {
    let path = require_str(options, "picopkg.make_folder", "path")?;
    let dir = absolute_under(scope.work_dir, &path);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::io_with_path(&e, &dir))?;

    if let Some(key) = optional_str(options, "set_path_to") {
        scope
            .ctx
            .set_metadata(key, Value::String(dir.display().to_string()));
    }
    Ok(())
}

/// Write a metadata value, or a persist value with `persist: true`
fn set(options: &BTreeMap<String, Value>, scope: &mut StepScope<'_>) -> Result<(), Error> {
    let key = require_str(options, "picopkg.set", "key")?;
    let value = options.get("value").cloned().unwrap_or(Value::Null);
    if options.get("persist").and_then(Value::as_bool).unwrap_or(false) {
        scope.ctx.set_persist(key, value);
    } else {
        scope.ctx.set_metadata(key, value);
    }
    Ok(())
}

/// Change the working directory for subsequent shell steps
fn cd(options: &BTreeMap<String, Value>, scope: &mut StepScope<'_>) -> Result<(), Error> {
    let path = require_str(options, "picopkg.cd", "path")?;
    let path = PathBuf::from(path);
    *scope.cwd = if path.is_absolute() {
        path
    } else {
        scope.cwd.join(path)
    };
    Ok(())
}

/// Resolve templates in every field of the declared source options
fn resolve_sources(
    sources: &[SourceOption],
    ctx: &PackageContext,
) -> Result<Vec<SourceOption>, Error> {
    let mut resolved = Vec::with_capacity(sources.len());
    for option in sources {
        let archive = match &option.archive {
            Some(path) => {
                let path = vars::resolve(&path.display().to_string(), ctx)?;
                if path.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(path))
                }
            }
            None => None,
        };
        resolved.push(SourceOption {
            archive,
            url: resolve_opt(&option.url, ctx)?,
            md5: resolve_opt(&option.md5, ctx)?,
            sha1: resolve_opt(&option.sha1, ctx)?,
            sha256: resolve_opt(&option.sha256, ctx)?,
            sha512: resolve_opt(&option.sha512, ctx)?,
        });
    }
    Ok(resolved)
}

fn resolve_opt(
    value: &Option<String>,
    ctx: &PackageContext,
) -> Result<Option<String>, Error> {
    value.as_ref().map(|v| vars::resolve(v, ctx)).transpose()
}

fn absolute_under(root: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

fn optional_str(options: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    options.get(key).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn require_str(
    options: &BTreeMap<String, Value>,
    builtin: &str,
    key: &str,
) -> Result<String, Error> {
    optional_str(options, key).ok_or_else(|| {
        BuildError::MissingBuiltinOption {
            name: builtin.to_string(),
            option: key.to_string(),
        }
        .into()
    })
}
