//! Descriptor ingestion and configuration error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ConfigError {
    #[error("descriptor file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("duplicate package ID {id} in {path} (first defined in {first_path})")]
    DuplicatePackage {
        id: String,
        path: String,
        first_path: String,
    },

    #[error("invalid descriptor for {id}: {message}")]
    InvalidDescriptor { id: String, message: String },
}

impl UserFacingError for ConfigError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::NotFound { .. } => "config.not_found",
            Self::ParseError { .. } => "config.parse_error",
            Self::DuplicatePackage { .. } => "config.duplicate_package",
            Self::InvalidDescriptor { .. } => "config.invalid_descriptor",
        };
        Some(code)
    }
}
