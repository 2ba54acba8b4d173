//! Source acquisition and verification error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum SourceError {
    #[error("source verification failed for {package}: all {attempts} source option(s) exhausted")]
    VerificationFailed { package: String, attempts: usize },

    #[error("{algorithm} mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("package {package} declares no source options")]
    NoSourceOptions { package: String },

    #[error("local archive not found: {path}")]
    MissingArchive { path: String },

    #[error("no saved archive to verify for {package}")]
    NoSavedArchive { package: String },
}

impl UserFacingError for SourceError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::VerificationFailed { .. } | Self::ChecksumMismatch { .. } => {
                Some("Check the declared checksums and source URLs in the descriptor.")
            }
            Self::MissingArchive { .. } => Some("Verify the local archive path exists."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::VerificationFailed { .. } => "source.verification_failed",
            Self::ChecksumMismatch { .. } => "source.checksum_mismatch",
            Self::NoSourceOptions { .. } => "source.no_source_options",
            Self::MissingArchive { .. } => "source.missing_archive",
            Self::NoSavedArchive { .. } => "source.no_saved_archive",
        };
        Some(code)
    }
}
