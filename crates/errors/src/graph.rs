//! Dependency graph error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum GraphError {
    #[error("unknown dependency: {package} depends on {dependency}, which is not defined")]
    UnknownDependency { package: String, dependency: String },

    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("duplicate dependency: {package} lists {dependency} more than once")]
    DuplicateDependency { package: String, dependency: String },
}

impl UserFacingError for GraphError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownDependency { .. } => {
                Some("Define the missing package or remove it from `depends`.")
            }
            Self::CyclicDependency { .. } => {
                Some("Break the cycle by removing one of the `depends` edges.")
            }
            Self::DuplicateDependency { .. } => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnknownDependency { .. } => "graph.unknown_dependency",
            Self::CyclicDependency { .. } => "graph.cyclic_dependency",
            Self::DuplicateDependency { .. } => "graph.duplicate_dependency",
        };
        Some(code)
    }
}
