//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// picopkg - tiny YAML-driven package build orchestrator
#[derive(Parser)]
#[command(name = "picopkg")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build packages from YAML descriptors in dependency order")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Descriptor file to load (plus anything it includes)
    #[arg(short = 'f', long, global = true, default_value = "picopkg.yaml")]
    pub file: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Build every package in the descriptor set
    #[command(alias = "b")]
    Build {
        /// Directory that holds per-package work areas
        #[arg(long, default_value = "picopkg-work", value_name = "DIR")]
        build_root: PathBuf,

        /// Cache file; omitted means no caching across runs
        #[arg(long, value_name = "PATH")]
        cache: Option<PathBuf>,

        /// Maximum number of packages building at once
        #[arg(short = 'j', long, default_value_t = 4)]
        jobs: usize,

        /// Per-command timeout in seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
    },

    /// Validate the descriptor set and print the wave ordering
    Plan,
}
