#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network layer for picopkg
//!
//! Provides the download primitive the pipeline consumes: `fetch(url) ->
//! local path`. Transport details (connection pooling, retry with backoff,
//! streaming to disk) stay behind this seam.

mod client;
mod download;

pub use client::{NetClient, NetConfig};
pub use download::fetch_to_path;
