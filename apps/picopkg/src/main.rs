//! picopkg - tiny YAML-driven package build orchestrator
//!
//! The CLI loads the descriptor set, then hands it to the scheduler and
//! renders the event stream. All engine output arrives as events; nothing
//! below the CLI prints directly.

#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

mod cli;
mod events;
mod manifest;

use crate::cli::{Cli, Commands};
use crate::events::{format_duration, EventHandler};
use clap::Parser;
use picopkg_builder::{BuildConfig, Scheduler};
use picopkg_errors::{Error, UserFacingError};
use picopkg_resolver::DependencyGraph;
use picopkg_types::{PackageBuildState, RunReport};
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.debug);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e.user_message());
            if let Some(hint) = e.user_hint() {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Error> {
    debug!("loading descriptors from {}", cli.global.file.display());
    let descriptors = manifest::load(&cli.global.file).await?;

    match cli.command {
        Commands::Plan => {
            let graph = DependencyGraph::from_descriptors(descriptors.values());
            let order = graph.build_order()?;
            for (index, wave) in order.waves().iter().enumerate() {
                println!("wave {index}: {}", wave.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Build {
            build_root,
            cache,
            jobs,
            timeout,
        } => {
            let config = BuildConfig {
                max_concurrency: jobs,
                build_root,
                cache_path: cache,
                command_timeout: timeout.map(Duration::from_secs),
            };

            let (tx, mut rx) = picopkg_events::channel();
            let scheduler = Scheduler::new(config, tx)?;

            // Ctrl-C stops running commands and blocks everything queued.
            let cancel = scheduler.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("interrupted, cancelling");
                    cancel.cancel();
                }
            });

            let printer = tokio::spawn(async move {
                let mut handler = EventHandler;
                while let Some(event) = rx.recv().await {
                    handler.handle(&event);
                }
            });

            let result = scheduler.run(&descriptors).await;
            // Dropping the scheduler releases the event sender so the
            // printer drains and exits.
            drop(scheduler);
            let _ = printer.await;

            let report = result?.report;
            render_summary(&report);
            Ok(if report.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn render_summary(report: &RunReport) {
    let mut succeeded = 0usize;
    let mut cached = 0usize;
    let mut failed = 0usize;
    let mut blocked = 0usize;

    println!();
    for package in &report.packages {
        match package.outcome {
            PackageBuildState::Succeeded => {
                succeeded += 1;
                println!(
                    "  ok      {} ({})",
                    package.id,
                    format_duration(package.duration)
                );
            }
            PackageBuildState::Cached => {
                cached += 1;
                println!("  cached  {}", package.id);
            }
            PackageBuildState::Failed => {
                failed += 1;
                let stage = package
                    .failed_stage
                    .map_or_else(String::new, |s| format!(" at {s}"));
                println!("  FAILED  {}{stage}", package.id);
            }
            _ => {
                blocked += 1;
                println!("  blocked {}", package.id);
            }
        }
    }
    println!("{succeeded} built, {cached} cached, {failed} failed, {blocked} blocked");
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if debug { "picopkg=debug" } else { "picopkg=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
