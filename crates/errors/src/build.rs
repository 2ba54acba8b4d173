//! Pipeline execution error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum BuildError {
    #[error("step {step} of stage {stage} failed: {message}")]
    StepExecutionFailed {
        stage: String,
        step: usize,
        message: String,
    },

    #[error("command exited with status {code}: {command}")]
    CommandFailed { command: String, code: i32 },

    #[error("unknown built-in action: {name}")]
    UnknownBuiltin { name: String },

    #[error("built-in {name} is missing required option {option}")]
    MissingBuiltinOption { name: String, option: String },

    #[error("command timed out after {seconds} seconds: {command}")]
    Timeout { command: String, seconds: u64 },

    #[error("build of {package} was cancelled")]
    Cancelled { package: String },

    #[error("extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("unsupported archive format: {path}")]
    UnsupportedArchiveFormat { path: String },
}

impl UserFacingError for BuildError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } => Some("Increase the per-command timeout and retry."),
            Self::UnknownBuiltin { .. } => {
                Some("Built-in names must match a registered picopkg.* action.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::StepExecutionFailed { .. } => "build.step_execution_failed",
            Self::CommandFailed { .. } => "build.command_failed",
            Self::UnknownBuiltin { .. } => "build.unknown_builtin",
            Self::MissingBuiltinOption { .. } => "build.missing_builtin_option",
            Self::Timeout { .. } => "build.timeout",
            Self::Cancelled { .. } => "build.cancelled",
            Self::ExtractionFailed { .. } => "build.extraction_failed",
            Self::UnsupportedArchiveFormat { .. } => "build.unsupported_archive_format",
        };
        Some(code)
    }
}
