//! Package lifecycle states and pipeline stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stages in fixed execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Verify,
    Configure,
    Build,
    Test,
    Install,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 6] = [
        Stage::Extract,
        Stage::Verify,
        Stage::Configure,
        Stage::Build,
        Stage::Test,
        Stage::Install,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extract => "extract",
            Self::Verify => "verify",
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Test => "test",
            Self::Install => "install",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle of one package within a run
///
/// `Pending -> Ready -> Running(stage) -> {Cached | Succeeded | Failed | Blocked}`.
/// State is owned exclusively by the scheduler; executors only report stage
/// transitions and the terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageBuildState {
    /// Waiting on dependencies
    Pending,
    /// All dependencies are Succeeded or Cached
    Ready,
    /// Pipeline executor is running the given stage
    Running(Stage),
    /// Served from the build cache; pipeline skipped
    Cached,
    Succeeded,
    Failed,
    /// A dependency ended Failed or Blocked; never started
    Blocked,
}

impl PackageBuildState {
    /// Whether the package has reached a terminal state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Cached | Self::Succeeded | Self::Failed | Self::Blocked
        )
    }

    /// Whether dependents may proceed past this package
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Cached | Self::Succeeded)
    }
}

impl fmt::Display for PackageBuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running(stage) => write!(f, "running({stage})"),
            Self::Cached => write!(f, "cached"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}
