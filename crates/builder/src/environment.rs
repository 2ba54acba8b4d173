//! Shell step environment and process execution
//!
//! Environment templates resolve at the moment a command runs, so values
//! computed by earlier steps (a `prefix` from `picopkg.make_folder`, say)
//! are visible. Inheritance pulls the resolved env of direct dependencies
//! in declared order; the package's own definitions always win.

use crate::context::PackageContext;
use crate::vars;
use picopkg_errors::{BuildError, Error};
use picopkg_types::PackageDescriptor;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::watch;

/// Resolve the environment map for a package's shell steps
///
/// # Errors
///
/// Propagates template resolution errors from env values.
pub fn resolve_env(
    descriptor: &PackageDescriptor,
    ctx: &PackageContext,
) -> Result<BTreeMap<String, String>, Error> {
    let mut env = BTreeMap::new();

    if descriptor.settings.inherit_build_env_from_depends {
        for dep in &descriptor.depends {
            for (key, value) in ctx.dependency_env(dep) {
                env.entry(key).or_insert(value);
            }
        }
    }

    for (key, template) in &descriptor.env {
        env.insert(key.clone(), vars::resolve(template, ctx)?);
    }

    Ok(env)
}

/// Captured result of one shell command
#[derive(Debug)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run a resolved shell command via `sh -c` in the given working directory
///
/// The command's process environment is the orchestrator's own plus the
/// resolved package env. Returns the captured output whatever the exit
/// status; callers decide what a nonzero status means.
///
/// # Errors
///
/// `Error::Cancelled` when the run is cancelled mid-command,
/// `BuildError::Timeout` when a per-command timeout elapses, or an I/O
/// error if the process cannot be spawned.
pub async fn run_command(
    command: &str,
    cwd: &Path,
    env: &BTreeMap<String, String>,
    timeout: Option<Duration>,
    cancel: &watch::Receiver<bool>,
) -> Result<CommandOutput, Error> {
    if *cancel.borrow() {
        return Err(Error::Cancelled);
    }

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let child = cmd
        .spawn()
        .map_err(|e| Error::io_with_path(&e, cwd))?;

    let cancelled = async {
        let mut rx = cancel.clone();
        if rx.wait_for(|flag| *flag).await.is_err() {
            // Cancellation source dropped; this run can no longer be
            // cancelled.
            std::future::pending::<()>().await;
        }
    };
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        output = child.wait_with_output() => {
            let output = output?;
            Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        () = deadline => {
            Err(BuildError::Timeout {
                command: command.to_string(),
                seconds: timeout.unwrap_or_default().as_secs(),
            }
            .into())
        }
        () = cancelled => Err(Error::Cancelled),
    }
}
