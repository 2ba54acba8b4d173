//! Domain-driven event definitions

use picopkg_types::Stage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level application event, grouped by domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    General(GeneralEvent),
    Resolver(ResolverEvent),
    Download(DownloadEvent),
    Build(BuildEvent),
}

/// General-purpose diagnostics and operation lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GeneralEvent {
    DebugLog { message: String },
    Warning { message: String },
    Error { message: String },
    OperationStarted { operation: String },
    OperationCompleted { operation: String, success: bool },
}

impl GeneralEvent {
    pub fn debug(message: impl Into<String>) -> Self {
        Self::DebugLog {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Dependency resolution events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResolverEvent {
    GraphValidated {
        packages: usize,
        waves: usize,
    },
    WaveStarted {
        index: usize,
        packages: Vec<String>,
    },
}

/// Source download events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DownloadEvent {
    Started {
        url: String,
        total_size: Option<u64>,
    },
    Completed {
        url: String,
        size: u64,
    },
    Failed {
        url: String,
        error: String,
    },
    Retrying {
        url: String,
        attempt: u32,
        max_attempts: u32,
    },
}

/// Package pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BuildEvent {
    PackageStarted {
        package: String,
    },
    StageStarted {
        package: String,
        stage: Stage,
    },
    StageCompleted {
        package: String,
        stage: Stage,
    },
    CommandStarted {
        package: String,
        command: String,
    },
    CommandCompleted {
        package: String,
        command: String,
        exit_code: Option<i32>,
    },
    SourceOptionRejected {
        package: String,
        option: usize,
        reason: String,
    },
    CacheHit {
        package: String,
        fingerprint: String,
    },
    PackageCompleted {
        package: String,
        duration: Duration,
    },
    PackageFailed {
        package: String,
        stage: Stage,
        error: String,
    },
    PackageBlocked {
        package: String,
        dependency: String,
    },
}
