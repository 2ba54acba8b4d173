//! Per-package and whole-run result records

use crate::state::{PackageBuildState, Stage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Structured result for one package, suitable for logging and reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageReport {
    pub id: String,
    /// Terminal state the package reached
    pub outcome: PackageBuildState,
    /// Stage that failed, when the outcome is Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    pub duration: Duration,
    pub cache_hit: bool,
    /// Underlying cause for a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PackageReport {
    /// Report for a package that never ran because a dependency failed
    #[must_use]
    pub fn blocked(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            outcome: PackageBuildState::Blocked,
            failed_stage: None,
            duration: Duration::ZERO,
            cache_hit: false,
            error: None,
        }
    }
}

/// Outcome of a full run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub packages: Vec<PackageReport>,
}

impl RunReport {
    /// Exit status of a run: success only if no package failed or was blocked
    #[must_use]
    pub fn success(&self) -> bool {
        self.packages.iter().all(|p| p.outcome.is_satisfied())
    }

    /// Whether any package directly failed (a blocked-only run still counts
    /// as an overall failure for exit purposes, but not as a direct failure)
    #[must_use]
    pub fn any_failed(&self) -> bool {
        self.packages
            .iter()
            .any(|p| p.outcome == PackageBuildState::Failed)
    }

    #[must_use]
    pub fn package(&self, id: &str) -> Option<&PackageReport> {
        self.packages.iter().find(|p| p.id == id)
    }
}
