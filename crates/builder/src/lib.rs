#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Pipeline execution engine for picopkg
//!
//! The scheduler takes a validated descriptor set through wave-ordered,
//! bounded-concurrency execution. Each package runs a fixed stage pipeline
//! (extract, verify, configure, build, test, install) whose steps are shell
//! command templates or `picopkg.*` built-ins. A fingerprint-keyed cache
//! skips packages whose inputs have not changed.

mod builtins;
mod context;
mod environment;
mod extract;
mod pipeline;
mod source;
mod vars;

pub mod cache;
mod scheduler;

pub use cache::{BuildCache, CacheEntry, CacheOutcome};
pub use context::{PackageContext, RunContext};
pub use scheduler::{BuildConfig, CancelHandle, RunOutcome, Scheduler};
