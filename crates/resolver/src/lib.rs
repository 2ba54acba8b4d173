#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Dependency resolution for picopkg
//!
//! Builds a directed graph from descriptor `depends` edges, validates it
//! (unknown dependencies, cycles), and produces the wave ordering the
//! scheduler consumes.

mod graph;

pub use graph::{BuildOrder, DependencyGraph};
