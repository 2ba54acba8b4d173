//! Wave-based concurrent build scheduling
//!
//! Packages run wave by wave: everything in a wave is mutually
//! independent, so waves are the unit of parallelism. A semaphore bounds
//! how many pipelines run at once. A package whose dependency failed or
//! was blocked never starts; the blockage propagates forward through
//! later waves via the per-package readiness check.

use crate::cache::{self, BuildCache, CacheEntry, CacheOutcome};
use crate::context::{PackageContext, RunContext, OVERLAY_METADATA};
use crate::pipeline::PipelineExecutor;
use picopkg_errors::Error;
use picopkg_events::{AppEvent, BuildEvent, EventEmitter, EventSender, ResolverEvent};
use picopkg_hash::Fingerprint;
use picopkg_net::NetClient;
use picopkg_resolver::DependencyGraph;
use picopkg_types::{
    Overlay, PackageBuildState, PackageDescriptor, PackageReport, RunReport, Stage,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Knobs for one build run
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Upper bound on concurrently running pipelines
    pub max_concurrency: usize,
    /// Directory that holds per-package work areas
    pub build_root: PathBuf,
    /// Cache file; `None` keeps the cache in memory for this run only
    pub cache_path: Option<PathBuf>,
    /// Per-command timeout for shell steps
    pub command_timeout: Option<Duration>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            build_root: PathBuf::from("picopkg-work"),
            cache_path: None,
            command_timeout: None,
        }
    }
}

/// Everything a finished run hands back: per-package outcomes plus the
/// run context, whose finalized overlays and persist namespace callers
/// can inspect after the fact
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub context: Arc<RunContext>,
}

/// Cooperative cancellation for a running build
#[derive(Debug, Clone)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Stop running commands and block everything not yet started
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Drives a descriptor set through resolution, caching, and execution
pub struct Scheduler {
    config: BuildConfig,
    net: NetClient,
    tx: EventSender,
    cancel: watch::Sender<bool>,
}

impl Scheduler {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be constructed.
    pub fn new(config: BuildConfig, tx: EventSender) -> Result<Self, Error> {
        let (cancel, _) = watch::channel(false);
        Ok(Self {
            config,
            net: NetClient::with_defaults()?,
            tx,
            cancel,
        })
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Run the full descriptor set and report per-package outcomes
    ///
    /// Graph problems (unknown dependencies, cycles, duplicates) fail the
    /// whole run before anything executes. Per-package failures land in
    /// the report instead.
    ///
    /// # Errors
    ///
    /// Resolution failures, cache I/O failures, or an internal scheduling
    /// fault.
    pub async fn run(
        &self,
        descriptors: &BTreeMap<String, PackageDescriptor>,
    ) -> Result<RunOutcome, Error> {
        for descriptor in descriptors.values() {
            descriptor.validate()?;
        }
        let graph = DependencyGraph::from_descriptors(descriptors.values());
        let order = graph.build_order()?;
        self.tx.emit(AppEvent::Resolver(ResolverEvent::GraphValidated {
            packages: order.package_count(),
            waves: order.waves().len(),
        }));
        self.tx.emit_operation_started("build");

        let cache = match &self.config.cache_path {
            Some(path) => BuildCache::load(path).await?,
            None => BuildCache::in_memory(),
        };
        tokio::fs::create_dir_all(&self.config.build_root)
            .await
            .map_err(|e| Error::io_with_path(&e, &self.config.build_root))?;

        let run_ctx = Arc::new(RunContext::new());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut states: BTreeMap<String, PackageBuildState> = descriptors
            .keys()
            .map(|id| (id.clone(), PackageBuildState::Pending))
            .collect();
        let mut fingerprints: BTreeMap<String, Fingerprint> = BTreeMap::new();
        let mut reports: Vec<PackageReport> = Vec::new();

        for (index, wave) in order.waves().iter().enumerate() {
            self.tx.emit(AppEvent::Resolver(ResolverEvent::WaveStarted {
                index,
                packages: wave.clone(),
            }));

            let mut tasks: JoinSet<TaskResult> = JoinSet::new();
            for id in wave {
                let blocking_dep = graph.dependencies(id).iter().find(|dep| {
                    states
                        .get(dep.as_str())
                        .copied()
                        .is_none_or(|state| !state.is_satisfied())
                });
                if let Some(dep) = blocking_dep {
                    states.insert(id.clone(), PackageBuildState::Blocked);
                    self.tx.emit(AppEvent::Build(BuildEvent::PackageBlocked {
                        package: id.clone(),
                        dependency: dep.clone(),
                    }));
                    let mut report = PackageReport::blocked(id);
                    report.error = Some(format!("dependency {dep} did not complete"));
                    reports.push(report);
                    continue;
                }
                if *self.cancel.borrow() {
                    states.insert(id.clone(), PackageBuildState::Blocked);
                    let mut report = PackageReport::blocked(id);
                    report.error = Some("run cancelled".to_string());
                    reports.push(report);
                    continue;
                }

                let descriptor = descriptors
                    .get(id)
                    .ok_or_else(|| Error::internal(format!("descriptor {id} disappeared")))?
                    .clone();
                let mut dep_fingerprints = Vec::with_capacity(descriptor.depends.len());
                for dep in &descriptor.depends {
                    let fp = fingerprints.get(dep).cloned().ok_or_else(|| {
                        Error::internal(format!("missing fingerprint for dependency {dep}"))
                    })?;
                    dep_fingerprints.push(fp);
                }
                let fingerprint = cache::package_fingerprint(&descriptor, &dep_fingerprints)?;
                fingerprints.insert(id.clone(), fingerprint.clone());

                let cached = cache
                    .lookup(id, &fingerprint)
                    .filter(|entry| entry.outcome == CacheOutcome::Succeeded);

                states.insert(id.clone(), PackageBuildState::Ready);
                let task = BuildTask {
                    id: id.clone(),
                    descriptor,
                    fingerprint,
                    cached,
                    run_ctx: Arc::clone(&run_ctx),
                    net: self.net.clone(),
                    tx: self.tx.clone(),
                    cancel: self.cancel.subscribe(),
                    semaphore: Arc::clone(&semaphore),
                    work_dir: self.config.build_root.join(id),
                    command_timeout: self.config.command_timeout,
                };
                tasks.spawn(task.run());
            }

            while let Some(joined) = tasks.join_next().await {
                let TaskResult {
                    id,
                    outcome,
                    duration,
                } = joined.map_err(|e| Error::internal(format!("build task failed: {e}")))?;

                match outcome {
                    TaskOutcome::Succeeded { overlay } => {
                        if let Some(fp) = fingerprints.get(&id) {
                            cache.record(&id, CacheEntry::succeeded(fp.clone(), overlay.clone()));
                        }
                        run_ctx.finalize(&id, overlay);
                        states.insert(id.clone(), PackageBuildState::Succeeded);
                        reports.push(PackageReport {
                            id,
                            outcome: PackageBuildState::Succeeded,
                            failed_stage: None,
                            duration,
                            cache_hit: false,
                            error: None,
                        });
                    }
                    TaskOutcome::Cached => {
                        states.insert(id.clone(), PackageBuildState::Cached);
                        reports.push(PackageReport {
                            id,
                            outcome: PackageBuildState::Cached,
                            failed_stage: None,
                            duration,
                            cache_hit: true,
                            error: None,
                        });
                    }
                    TaskOutcome::Failed { stage, error } => {
                        if let Some(fp) = fingerprints.get(&id) {
                            cache.record(&id, CacheEntry::failed(fp.clone()));
                        }
                        states.insert(id.clone(), PackageBuildState::Failed);
                        reports.push(PackageReport {
                            id,
                            outcome: PackageBuildState::Failed,
                            failed_stage: stage,
                            duration,
                            cache_hit: false,
                            error: Some(error.to_string()),
                        });
                    }
                }
            }
        }

        cache.save().await?;
        let report = RunReport { packages: reports };
        self.tx.emit_operation_completed("build", report.success());
        Ok(RunOutcome {
            report,
            context: run_ctx,
        })
    }
}

struct TaskResult {
    id: String,
    outcome: TaskOutcome,
    duration: Duration,
}

enum TaskOutcome {
    Succeeded { overlay: Overlay },
    Cached,
    Failed { stage: Option<Stage>, error: Error },
}

struct BuildTask {
    id: String,
    descriptor: PackageDescriptor,
    fingerprint: Fingerprint,
    cached: Option<CacheEntry>,
    run_ctx: Arc<RunContext>,
    net: NetClient,
    tx: EventSender,
    cancel: watch::Receiver<bool>,
    semaphore: Arc<Semaphore>,
    work_dir: PathBuf,
    command_timeout: Option<Duration>,
}

impl BuildTask {
    async fn run(self) -> TaskResult {
        let start = Instant::now();
        let id = self.id.clone();
        let tx = self.tx.clone();
        let outcome = self.execute().await;
        let duration = start.elapsed();

        match &outcome {
            TaskOutcome::Succeeded { .. } => {
                tx.emit(AppEvent::Build(BuildEvent::PackageCompleted {
                    package: id.clone(),
                    duration,
                }));
            }
            TaskOutcome::Failed { stage, error } => match stage {
                Some(stage) => tx.emit(AppEvent::Build(BuildEvent::PackageFailed {
                    package: id.clone(),
                    stage: *stage,
                    error: error.to_string(),
                })),
                None => tx.emit_error(format!("{id}: {error}")),
            },
            TaskOutcome::Cached => {}
        }

        TaskResult {
            id,
            outcome,
            duration,
        }
    }

    async fn execute(self) -> TaskOutcome {
        let Ok(_permit) = self.semaphore.clone().acquire_owned().await else {
            return TaskOutcome::Failed {
                stage: None,
                error: Error::Cancelled,
            };
        };

        if let Err(e) = tokio::fs::create_dir_all(&self.work_dir).await {
            return TaskOutcome::Failed {
                stage: None,
                error: Error::io_with_path(&e, &self.work_dir),
            };
        }

        if let Some(entry) = &self.cached {
            return self.replay_cached(entry).await;
        }

        self.tx.emit(AppEvent::Build(BuildEvent::PackageStarted {
            package: self.id.clone(),
        }));
        let ctx = match PackageContext::new(&self.descriptor, &self.run_ctx) {
            Ok(ctx) => ctx,
            Err(error) => return TaskOutcome::Failed { stage: None, error },
        };
        let executor = PipelineExecutor::new(
            &self.descriptor,
            ctx,
            self.work_dir.clone(),
            &self.net,
            self.tx.clone(),
            self.cancel.clone(),
            self.command_timeout,
        );
        match executor.run().await {
            Ok(overlay) => TaskOutcome::Succeeded { overlay },
            Err((stage, error)) => TaskOutcome::Failed {
                stage: Some(stage),
                error,
            },
        }
    }

    /// Serve a package from its cache entry: make the recorded overlay
    /// visible, then run only the actions marked `always: true`
    async fn replay_cached(&self, entry: &CacheEntry) -> TaskOutcome {
        self.tx.emit(AppEvent::Build(BuildEvent::CacheHit {
            package: self.id.clone(),
            fingerprint: self.fingerprint.to_hex(),
        }));
        self.run_ctx.replay(&self.id, entry.overlay.clone());

        let metadata: Overlay = match entry.overlay.get(OVERLAY_METADATA) {
            Some(Value::Object(map)) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            _ => Overlay::new(),
        };
        let ctx = match PackageContext::with_metadata(
            &self.id,
            metadata,
            &self.descriptor.depends,
            &self.run_ctx,
        ) {
            Ok(ctx) => ctx,
            Err(error) => return TaskOutcome::Failed { stage: None, error },
        };
        let executor = PipelineExecutor::new(
            &self.descriptor,
            ctx,
            self.work_dir.clone(),
            &self.net,
            self.tx.clone(),
            self.cancel.clone(),
            self.command_timeout,
        );
        match executor.run_always().await {
            Ok(()) => TaskOutcome::Cached,
            Err((stage, error)) => TaskOutcome::Failed {
                stage: Some(stage),
                error,
            },
        }
    }
}
