#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core data model for the picopkg build orchestrator
//!
//! Descriptors are immutable after load; everything computed during a run
//! lives in the builder's `RunContext`, not here.

pub mod descriptor;
pub mod reports;
pub mod state;
pub mod step;

pub use descriptor::{
    ActionName, ActionRef, ChecksumKind, PackageDescriptor, Settings, SourceOption,
};
pub use reports::{PackageReport, RunReport};
pub use state::{PackageBuildState, Stage};
pub use step::Step;

use std::collections::BTreeMap;

/// Metadata overlay computed for a package during a run (e.g. `prefix`)
///
/// Keys map to JSON values so dotted template paths can walk nested maps.
pub type Overlay = BTreeMap<String, serde_json::Value>;
