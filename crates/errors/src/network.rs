//! Network error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum NetworkError {
    #[error("download failed: {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("connection timeout: {url}")]
    Timeout { url: String },
}

impl UserFacingError for NetworkError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::DownloadFailed { .. } | Self::Timeout { .. } => {
                Some("Check network connectivity, or provide a local archive path.")
            }
            Self::InvalidUrl { .. } => Some("Correct the source URL in the descriptor."),
            Self::HttpStatus { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::DownloadFailed { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::InvalidUrl { .. } => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::DownloadFailed { .. } => "network.download_failed",
            Self::InvalidUrl { .. } => "network.invalid_url",
            Self::HttpStatus { .. } => "network.http_status",
            Self::Timeout { .. } => "network.timeout",
        };
        Some(code)
    }
}
