//! Package descriptor model
//!
//! A descriptor is the static declaration of a package: metadata, the
//! `depends` edge list, environment templates, source options, and the named
//! action lists the pipeline executes.

use crate::step::Step;
use picopkg_errors::{Error, GraphError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Per-package settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Merge environment variables from direct dependencies into shell steps.
    /// The package's own `env` always wins over inherited values.
    #[serde(default)]
    pub inherit_build_env_from_depends: bool,
}

/// One source option: a local archive and/or a URL, with declared checksums
///
/// Options are tried in declared order; a download failure or any checksum
/// mismatch rejects the option and advances to the next one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
}

impl SourceOption {
    /// Checksums the descriptor actually declares (empty strings are treated
    /// as undeclared, so optional template fields can resolve to "")
    #[must_use]
    pub fn declared_checksums(&self) -> Vec<(ChecksumKind, &str)> {
        let mut declared = Vec::new();
        let fields = [
            (ChecksumKind::Md5, &self.md5),
            (ChecksumKind::Sha1, &self.sha1),
            (ChecksumKind::Sha256, &self.sha256),
            (ChecksumKind::Sha512, &self.sha512),
        ];
        for (kind, value) in fields {
            if let Some(v) = value {
                if !v.is_empty() {
                    declared.push((kind, v.as_str()));
                }
            }
        }
        declared
    }
}

/// Checksum algorithms supported for source verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        };
        write!(f, "{name}")
    }
}

/// The named action lists a descriptor may define
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionName {
    Download,
    Extract,
    Prepare,
    Config,
    Build,
    Test,
    Install,
}

impl ActionName {
    /// All action names in canonical pipeline order
    pub const ALL: [ActionName; 7] = [
        ActionName::Download,
        ActionName::Extract,
        ActionName::Prepare,
        ActionName::Config,
        ActionName::Build,
        ActionName::Test,
        ActionName::Install,
    ];
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Download => "download",
            Self::Extract => "extract",
            Self::Prepare => "prepare",
            Self::Config => "config",
            Self::Build => "build",
            Self::Test => "test",
            Self::Install => "install",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ActionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "download" => Ok(Self::Download),
            "extract" => Ok(Self::Extract),
            "prepare" => Ok(Self::Prepare),
            "config" => Ok(Self::Config),
            "build" => Ok(Self::Build),
            "test" => Ok(Self::Test),
            "install" => Ok(Self::Install),
            other => Err(format!("unknown action name: {other}")),
        }
    }
}

/// Entry in a descriptor's ordered `actions` list
///
/// Serialized either as a bare action name or as a single-key map carrying
/// inline options: `- config` or `- config: { always: true }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    pub name: ActionName,
    /// Run this action even when the package is served from the build cache
    pub always: bool,
}

impl ActionRef {
    #[must_use]
    pub fn new(name: ActionName) -> Self {
        Self {
            name,
            always: false,
        }
    }

    /// The default action sequence when a descriptor declares none
    #[must_use]
    pub fn default_sequence() -> Vec<ActionRef> {
        ActionName::ALL.into_iter().map(ActionRef::new).collect()
    }
}

#[derive(Deserialize)]
struct ActionRefOptions {
    #[serde(default)]
    always: bool,
}

impl<'de> Deserialize<'de> for ActionRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            WithOptions(BTreeMap<String, ActionRefOptions>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Name(name) => {
                let name = ActionName::from_str(&name).map_err(serde::de::Error::custom)?;
                Ok(ActionRef::new(name))
            }
            Raw::WithOptions(map) => {
                let mut entries = map.into_iter();
                let (name, options) = entries.next().ok_or_else(|| {
                    serde::de::Error::custom("action entry must name exactly one action")
                })?;
                if entries.next().is_some() {
                    return Err(serde::de::Error::custom(
                        "action entry must name exactly one action",
                    ));
                }
                let name = ActionName::from_str(&name).map_err(serde::de::Error::custom)?;
                Ok(ActionRef {
                    name,
                    always: options.always,
                })
            }
        }
    }
}

impl Serialize for ActionRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        if self.always {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry(
                &self.name.to_string(),
                &serde_json::json!({ "always": true }),
            )?;
            map.end()
        } else {
            serializer.serialize_str(&self.name.to_string())
        }
    }
}

/// Immutable declaration of a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Unique package ID; filled from the descriptor map key during ingestion
    #[serde(default)]
    pub id: String,

    /// Arbitrary key/value metadata (name, source_url, source_folder, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// IDs of packages this one depends on, in declared order
    #[serde(default)]
    pub depends: Vec<String>,

    /// Environment variable templates for shell steps
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub settings: Settings,

    /// Ordered source options for acquisition and verification
    #[serde(default)]
    pub sources: Vec<SourceOption>,

    /// Which actions run (and their inline options); defaults to all
    #[serde(default = "ActionRef::default_sequence")]
    pub actions: Vec<ActionRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub download: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prepare: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<Step>,
}

impl PackageDescriptor {
    /// Create an empty descriptor with the given ID
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: BTreeMap::new(),
            depends: Vec::new(),
            env: BTreeMap::new(),
            settings: Settings::default(),
            sources: Vec::new(),
            actions: ActionRef::default_sequence(),
            download: Vec::new(),
            extract: Vec::new(),
            prepare: Vec::new(),
            config: Vec::new(),
            build: Vec::new(),
            test: Vec::new(),
            install: Vec::new(),
        }
    }

    /// The step list for a named action; absent lists are empty (a no-op)
    #[must_use]
    pub fn action_steps(&self, name: ActionName) -> &[Step] {
        match name {
            ActionName::Download => &self.download,
            ActionName::Extract => &self.extract,
            ActionName::Prepare => &self.prepare,
            ActionName::Config => &self.config,
            ActionName::Build => &self.build,
            ActionName::Test => &self.test,
            ActionName::Install => &self.install,
        }
    }

    /// The `actions` entry for a named action, if the descriptor enables it
    #[must_use]
    pub fn action_ref(&self, name: ActionName) -> Option<&ActionRef> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Reject duplicate entries in `depends`
    ///
    /// # Errors
    ///
    /// Returns `GraphError::DuplicateDependency` naming the repeated edge.
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = std::collections::BTreeSet::new();
        for dep in &self.depends {
            if !seen.insert(dep.as_str()) {
                return Err(GraphError::DuplicateDependency {
                    package: self.id.clone(),
                    dependency: dep.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}
