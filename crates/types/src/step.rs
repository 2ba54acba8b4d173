//! Pipeline step sum type
//!
//! A step is either a built-in action invocation or a shell command template.
//! In descriptor files a shell command is a bare string and a built-in is a
//! single-key map (`- picopkg.download: { save_to: archive }`); a bare string
//! with the `picopkg.` prefix is a built-in with no options.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix that distinguishes built-in action names from shell commands
pub const BUILTIN_PREFIX: &str = "picopkg.";

/// One step within an action list, executed in declared order
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A built-in, engine-implemented action with an options mapping whose
    /// values may be templates
    Builtin {
        name: String,
        options: BTreeMap<String, serde_json::Value>,
    },
    /// A shell command template, resolved then run in the package workdir
    Shell(String),
}

impl Step {
    /// Shorthand for a shell step
    #[must_use]
    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell(command.into())
    }

    /// Shorthand for a built-in step without options
    #[must_use]
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::Builtin {
            name: name.into(),
            options: BTreeMap::new(),
        }
    }

    /// Shorthand for a built-in step with options
    #[must_use]
    pub fn builtin_with(
        name: impl Into<String>,
        options: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self::Builtin {
            name: name.into(),
            options,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin { name, .. } => write!(f, "{name}"),
            Self::Shell(command) => write!(f, "{command}"),
        }
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Invocation(BTreeMap<String, BTreeMap<String, serde_json::Value>>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => {
                if text.starts_with(BUILTIN_PREFIX) {
                    Ok(Step::builtin(text))
                } else {
                    Ok(Step::Shell(text))
                }
            }
            Raw::Invocation(map) => {
                let mut entries = map.into_iter();
                let (name, options) = entries.next().ok_or_else(|| {
                    serde::de::Error::custom("step map must name exactly one built-in")
                })?;
                if entries.next().is_some() {
                    return Err(serde::de::Error::custom(
                        "step map must name exactly one built-in",
                    ));
                }
                Ok(Step::Builtin { name, options })
            }
        }
    }
}

impl Serialize for Step {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            Self::Shell(command) => serializer.serialize_str(command),
            Self::Builtin { name, options } => {
                if options.is_empty() {
                    serializer.serialize_str(name)
                } else {
                    let mut map = serializer.serialize_map(Some(1))?;
                    map.serialize_entry(name, options)?;
                    map.end()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_step_from_bare_string() {
        let step: Step = serde_yml::from_str("make install PREFIX={metadata.prefix}").unwrap();
        assert_eq!(
            step,
            Step::shell("make install PREFIX={metadata.prefix}")
        );
    }

    #[test]
    fn builtin_step_from_prefixed_string() {
        let step: Step = serde_yml::from_str("picopkg.extract").unwrap();
        assert_eq!(step, Step::builtin("picopkg.extract"));
    }

    #[test]
    fn builtin_step_with_options() {
        let step: Step =
            serde_yml::from_str("picopkg.make_folder: { path: out, set_path_to: prefix }")
                .unwrap();
        let Step::Builtin { name, options } = step else {
            panic!("expected builtin step");
        };
        assert_eq!(name, "picopkg.make_folder");
        assert_eq!(options["path"], serde_json::json!("out"));
        assert_eq!(options["set_path_to"], serde_json::json!("prefix"));
    }

    #[test]
    fn step_roundtrip() {
        let steps = vec![
            Step::shell("./configure"),
            Step::builtin("picopkg.download"),
        ];
        let yaml = serde_yml::to_string(&steps).unwrap();
        let back: Vec<Step> = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(steps, back);
    }
}
