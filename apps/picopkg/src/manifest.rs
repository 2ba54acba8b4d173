//! YAML descriptor ingestion
//!
//! A descriptor file has a `pkgs:` mapping of package ID to descriptor and
//! an optional `include:` list of further files. Includes are followed
//! breadth-first, relative to the including file, and each file loads at
//! most once. A package ID defined twice anywhere in the set is a hard
//! error naming both files.

use picopkg_errors::{ConfigError, Error};
use picopkg_types::PackageDescriptor;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
struct ManifestFile {
    #[serde(default)]
    include: Vec<PathBuf>,
    #[serde(default)]
    pkgs: BTreeMap<String, PackageDescriptor>,
}

/// Load a descriptor file and everything it includes
///
/// # Errors
///
/// `ConfigError::NotFound` for a missing file, `ConfigError::ParseError`
/// for invalid YAML, `ConfigError::DuplicatePackage` when two files define
/// the same package ID.
pub async fn load(path: &Path) -> Result<BTreeMap<String, PackageDescriptor>, Error> {
    let mut descriptors = BTreeMap::new();
    // Which file first defined each package ID, for duplicate reporting
    let mut origins: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(path.to_path_buf());
    seen.insert(normalize(path));

    while let Some(file) = queue.pop_front() {
        let manifest = read_file(&file).await?;

        for include in manifest.include {
            // Includes resolve relative to the file that names them.
            let resolved = match file.parent() {
                Some(parent) if include.is_relative() => parent.join(include),
                _ => include,
            };
            if seen.insert(normalize(&resolved)) {
                queue.push_back(resolved);
            }
        }

        for (id, mut descriptor) in manifest.pkgs {
            if let Some(first) = origins.get(&id) {
                return Err(ConfigError::DuplicatePackage {
                    id,
                    path: file.display().to_string(),
                    first_path: first.display().to_string(),
                }
                .into());
            }
            descriptor.id.clone_from(&id);
            origins.insert(id.clone(), file.clone());
            descriptors.insert(id, descriptor);
        }
    }

    Ok(descriptors)
}

async fn read_file(path: &Path) -> Result<ManifestFile, Error> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into())
        }
        Err(e) => return Err(Error::io_with_path(&e, path)),
    };
    serde_yml::from_str(&text).map_err(|e| {
        ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
