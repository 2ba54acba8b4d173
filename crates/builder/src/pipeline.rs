//! Per-package pipeline execution
//!
//! The pipeline walks the fixed stage order and runs each stage's action
//! lists, step by step, failing fast on the first error. Stage-to-action
//! mapping: extract runs `download` then `extract`, verify re-checks the
//! acquired archive, configure runs `prepare` then `config`, and build,
//! test, and install each run their own list. A descriptor that omits an
//! action from its `actions` sequence skips it entirely.

use crate::builtins::{run_builtin, StepScope};
use crate::context::PackageContext;
use crate::environment;
use crate::source::{self, AcquiredSource};
use crate::vars;
use picopkg_errors::{BuildError, Error};
use picopkg_events::{AppEvent, BuildEvent, EventEmitter, EventSender};
use picopkg_net::NetClient;
use picopkg_types::{ActionName, Overlay, PackageDescriptor, Stage, Step};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// Action lists each stage runs, in order
fn stage_actions(stage: Stage) -> &'static [ActionName] {
    match stage {
        Stage::Extract => &[ActionName::Download, ActionName::Extract],
        // Verify is a pure recheck, not an action list.
        Stage::Verify => &[],
        Stage::Configure => &[ActionName::Prepare, ActionName::Config],
        Stage::Build => &[ActionName::Build],
        Stage::Test => &[ActionName::Test],
        Stage::Install => &[ActionName::Install],
    }
}

/// Runs one package's pipeline to completion
pub(crate) struct PipelineExecutor<'a> {
    descriptor: &'a PackageDescriptor,
    ctx: PackageContext,
    work_dir: PathBuf,
    /// Working directory for shell steps; moved by extract and `picopkg.cd`
    cwd: PathBuf,
    acquired: Option<AcquiredSource>,
    net: &'a NetClient,
    tx: EventSender,
    cancel: watch::Receiver<bool>,
    command_timeout: Option<Duration>,
}

impl<'a> PipelineExecutor<'a> {
    pub(crate) fn new(
        descriptor: &'a PackageDescriptor,
        ctx: PackageContext,
        work_dir: PathBuf,
        net: &'a NetClient,
        tx: EventSender,
        cancel: watch::Receiver<bool>,
        command_timeout: Option<Duration>,
    ) -> Self {
        let cwd = work_dir.clone();
        Self {
            descriptor,
            ctx,
            work_dir,
            cwd,
            acquired: None,
            net,
            tx,
            cancel,
            command_timeout,
        }
    }

    /// Run the full pipeline, returning the finalized overlay
    ///
    /// # Errors
    ///
    /// The failing stage paired with the underlying error. Finalization
    /// failures are attributed to the install stage.
    pub(crate) async fn run(mut self) -> Result<Overlay, (Stage, Error)> {
        for stage in Stage::ALL {
            self.tx.emit(AppEvent::Build(BuildEvent::StageStarted {
                package: self.descriptor.id.clone(),
                stage,
            }));
            self.run_stage(stage, false).await.map_err(|e| (stage, e))?;
            self.tx.emit(AppEvent::Build(BuildEvent::StageCompleted {
                package: self.descriptor.id.clone(),
                stage,
            }));
        }
        self.finalize().map_err(|e| (Stage::Install, e))
    }

    /// Run only the actions marked `always: true`, for a cache-served
    /// package
    ///
    /// # Errors
    ///
    /// Same shape as [`PipelineExecutor::run`].
    pub(crate) async fn run_always(mut self) -> Result<(), (Stage, Error)> {
        for stage in Stage::ALL {
            self.run_stage(stage, true).await.map_err(|e| (stage, e))?;
        }
        Ok(())
    }

    async fn run_stage(&mut self, stage: Stage, always_only: bool) -> Result<(), Error> {
        self.check_cancelled()?;

        if stage == Stage::Verify {
            return self.verify_acquired().await;
        }

        for action in stage_actions(stage) {
            let Some(reference) = self.descriptor.action_ref(*action) else {
                continue;
            };
            if always_only && !reference.always {
                continue;
            }
            self.run_action(stage, *action).await?;
        }
        Ok(())
    }

    async fn run_action(&mut self, stage: Stage, action: ActionName) -> Result<(), Error> {
        // Indexing is per action list; errors name the step within it.
        for index in 0..self.descriptor.action_steps(action).len() {
            self.check_cancelled()?;
            let step = self.descriptor.action_steps(action)[index].clone();
            match step {
                Step::Shell(template) => self.run_shell(stage, index, &template).await?,
                Step::Builtin { name, options } => {
                    let mut scope = StepScope {
                        descriptor: self.descriptor,
                        ctx: &mut self.ctx,
                        work_dir: &self.work_dir,
                        cwd: &mut self.cwd,
                        acquired: &mut self.acquired,
                        net: self.net,
                        tx: &self.tx,
                    };
                    run_builtin(&name, &options, &mut scope).await?;
                }
            }
        }
        Ok(())
    }

    async fn run_shell(&mut self, stage: Stage, index: usize, template: &str) -> Result<(), Error> {
        let command = vars::resolve(template, &self.ctx)?;
        let env = environment::resolve_env(self.descriptor, &self.ctx)?;

        self.tx.emit(AppEvent::Build(BuildEvent::CommandStarted {
            package: self.descriptor.id.clone(),
            command: command.clone(),
        }));
        let output = environment::run_command(
            &command,
            &self.cwd,
            &env,
            self.command_timeout,
            &self.cancel,
        )
        .await?;
        self.tx.emit(AppEvent::Build(BuildEvent::CommandCompleted {
            package: self.descriptor.id.clone(),
            command: command.clone(),
            exit_code: output.exit_code,
        }));

        if output.succeeded() {
            return Ok(());
        }

        let code = output.exit_code.unwrap_or(-1);
        let mut message = BuildError::CommandFailed { command, code }.to_string();
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            message.push('\n');
            message.push_str(stderr);
        }
        Err(BuildError::StepExecutionFailed {
            stage: stage.to_string(),
            step: index,
            message,
        }
        .into())
    }

    /// Re-check the archive the extract stage acquired against the same
    /// option's checksums. A no-op when no acquisition ran.
    async fn verify_acquired(&self) -> Result<(), Error> {
        match &self.acquired {
            Some(acquired) => source::verify(&acquired.path, &acquired.option).await,
            None => Ok(()),
        }
    }

    fn finalize(self) -> Result<Overlay, Error> {
        let env = environment::resolve_env(self.descriptor, &self.ctx)?;
        Ok(self.ctx.into_overlay(env))
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        if *self.cancel.borrow() {
            return Err(BuildError::Cancelled {
                package: self.descriptor.id.clone(),
            }
            .into());
        }
        Ok(())
    }
}
