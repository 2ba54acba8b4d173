//! Variable resolution error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum VariableError {
    #[error("unresolved variable {{{reference}}} in package {package}")]
    UnresolvedVariable { package: String, reference: String },

    #[error(
        "package {package} references scope {scope}, which is not one of its declared dependencies"
    )]
    UndeclaredDependency { package: String, scope: String },

    #[error("unterminated variable reference in template: {template}")]
    UnterminatedReference { template: String },
}

impl UserFacingError for VariableError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UndeclaredDependency { .. } => {
                Some("Cross-package references require the target in `depends`.")
            }
            Self::UnresolvedVariable { .. } | Self::UnterminatedReference { .. } => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnresolvedVariable { .. } => "variable.unresolved",
            Self::UndeclaredDependency { .. } => "variable.undeclared_dependency",
            Self::UnterminatedReference { .. } => "variable.unterminated_reference",
        };
        Some(code)
    }
}
