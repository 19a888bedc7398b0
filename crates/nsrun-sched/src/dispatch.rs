use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use nsrun_core::errors::{ErrorInfo, NsError, ABORT_EXIT_STATUS};
use rayon::prelude::*;

use crate::context::ExecutionContext;
use crate::dynamic::DynamicRunCoordinator;
use crate::failure::FailureCoordinator;
use crate::job::JobSpec;
use crate::matrix::build_jobs;
use crate::output::{create_dir_tolerant, OutputAreaInitializer};
use crate::plan::BatchPlan;
use crate::progress::{GroupCounters, ProgressSink};
use crate::report::{BatchReport, JobOutcome, JobRecord, REPORT_FILE};
use crate::runner::JobRunner;
use crate::sampler::{RunArtifact, Sampler};
use crate::serde::{from_json_slice, to_canonical_json_bytes};

/// Options governing dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOpts {
    /// Number of jobs to execute in parallel.
    pub workers: usize,
    /// Overwrite completed artefacts instead of skipping them.
    pub clean: bool,
}

impl Default for DispatchOpts {
    fn default() -> Self {
        Self {
            workers: 1,
            clean: false,
        }
    }
}

/// File roots of `jobs` whose completed artefact already exists.
///
/// Always empty when `clean` is set.
pub fn completed_roots(jobs: &[JobSpec], clean: bool) -> BTreeSet<String> {
    if clean {
        return BTreeSet::new();
    }
    jobs.iter()
        .filter(|job| RunArtifact::is_complete(&job.output_dir, &job.file_root))
        .map(|job| job.file_root.clone())
        .collect()
}

/// Runs jobs on a bounded worker pool and records one outcome per job.
///
/// A cooperating rank executes its share of the batch alone: job `i` belongs
/// to rank `i % size`, so no two ranks ever write the same file root.
pub struct Dispatcher<'a> {
    ctx: &'a ExecutionContext,
    opts: DispatchOpts,
    progress: &'a dyn ProgressSink,
}

impl<'a> Dispatcher<'a> {
    /// Dispatcher for the calling process.
    pub fn new(ctx: &'a ExecutionContext, opts: DispatchOpts, progress: &'a dyn ProgressSink) -> Self {
        Self {
            ctx,
            opts,
            progress,
        }
    }

    /// Worker count actually used; a cooperating rank never runs its own pool.
    pub fn effective_workers(&self) -> usize {
        if self.ctx.is_multi_process() {
            1
        } else {
            self.opts.workers.max(1)
        }
    }

    /// Whether the calling rank executes `job`.
    pub fn owns(&self, job: &JobSpec) -> bool {
        job.position % self.ctx.size().max(1) == self.ctx.rank()
    }

    /// Executes the calling rank's share of `jobs`, taking the skip set from
    /// the artefacts present right now.
    pub fn dispatch(
        &self,
        jobs: &[JobSpec],
        runner: &dyn JobRunner,
    ) -> Result<Vec<JobRecord>, NsError> {
        let completed = completed_roots(jobs, self.opts.clean);
        self.dispatch_with(jobs, &completed, runner)
    }

    /// Executes the calling rank's share of `jobs` and returns their records
    /// in input order. Jobs listed in `completed` are reported skipped.
    ///
    /// Per-job failures are recorded, never propagated. The only error is
    /// [`NsError::Aborted`] once the global abort has been raised, after which
    /// no further job is started.
    pub fn dispatch_with(
        &self,
        jobs: &[JobSpec],
        completed: &BTreeSet<String>,
        runner: &dyn JobRunner,
    ) -> Result<Vec<JobRecord>, NsError> {
        let owned: Vec<&JobSpec> = jobs.iter().filter(|job| self.owns(job)).collect();
        let counters = GroupCounters::for_jobs(owned.iter().copied());
        let workers = self.effective_workers().min(owned.len().max(1));
        if self.ctx.is_multi_process() {
            tracing::debug!(
                rank = self.ctx.rank(),
                owned = owned.len(),
                requested = self.opts.workers,
                "cooperating rank, running its share without a worker pool"
            );
        }

        if workers == 1 {
            let mut records = Vec::with_capacity(owned.len());
            for job in owned {
                self.ctx.check_abort()?;
                records.push(self.execute(job, completed, runner, &counters));
            }
            return Ok(records);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|err| NsError::Dispatch(ErrorInfo::new("thread_pool", err.to_string())))?;
        let records: Vec<Option<JobRecord>> = pool.install(|| {
            owned
                .par_iter()
                .map(|job| {
                    (!self.ctx.is_aborted())
                        .then(|| self.execute(job, completed, runner, &counters))
                })
                .collect()
        });
        self.ctx.check_abort()?;
        Ok(records.into_iter().flatten().collect())
    }

    fn execute(
        &self,
        job: &JobSpec,
        completed: &BTreeSet<String>,
        runner: &dyn JobRunner,
        counters: &GroupCounters,
    ) -> JobRecord {
        let outcome = if completed.contains(&job.file_root) {
            tracing::info!(file_root = %job.file_root, "artefact exists, skipping");
            JobOutcome::Skipped
        } else {
            tracing::debug!(
                file_root = %job.file_root,
                method_group = %job.method_group,
                seed = job.seed.seed,
                "starting job"
            );
            match panic::catch_unwind(AssertUnwindSafe(|| runner.run_job(job))) {
                Ok(Ok(artifact)) => JobOutcome::Success {
                    ndead: artifact.ndead(),
                    log_evidence: artifact.log_evidence,
                },
                Ok(Err(err)) => {
                    tracing::warn!(file_root = %job.file_root, error = %err, "job failed");
                    JobOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
                Err(payload) => {
                    let detail = payload
                        .downcast_ref::<&str>()
                        .map(|msg| msg.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    let err = NsError::Sampler(
                        ErrorInfo::new("sampler_crashed", detail)
                            .with_context("file_root", job.file_root.clone()),
                    );
                    tracing::warn!(file_root = %job.file_root, error = %err, "sampler crashed");
                    JobOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            }
        };
        counters.complete(&job.method_group, self.progress);
        JobRecord {
            file_root: job.file_root.clone(),
            method_group: job.method_group.clone(),
            ordinal: job.ordinal,
            seed: job.seed.seed,
            outcome,
        }
    }
}

/// Path the coordinating process writes the batch report to.
pub fn report_path(plan: &BatchPlan) -> PathBuf {
    plan.settings.base_dir.join(REPORT_FILE)
}

/// Merges every rank's records on the coordinator, in batch order, and hands
/// the full list back to every rank.
fn exchange_records(
    ctx: &ExecutionContext,
    jobs: &[JobSpec],
    own: Vec<JobRecord>,
) -> Result<Vec<JobRecord>, NsError> {
    if !ctx.is_multi_process() {
        return Ok(own);
    }
    let merged = match ctx.gather(to_canonical_json_bytes(&own)?)? {
        Some(parts) => {
            let mut by_root = BTreeMap::new();
            for part in parts {
                let records: Vec<JobRecord> = from_json_slice(&part)?;
                for record in records {
                    by_root.insert(record.file_root.clone(), record);
                }
            }
            let ordered: Vec<JobRecord> = jobs
                .iter()
                .filter_map(|job| by_root.remove(&job.file_root))
                .collect();
            Some(to_canonical_json_bytes(&ordered)?)
        }
        None => None,
    };
    from_json_slice(&ctx.broadcast(merged)?)
}

/// Expands, prepares and executes a whole batch on the calling process.
///
/// Output directories and the skip set are settled once by the coordinating
/// rank before any job starts; a setup failure there aborts every rank.
/// Cooperating ranks split the jobs between them and every rank returns the
/// same merged report. Only the coordinator writes it to disk.
pub fn run_batch(
    plan: &BatchPlan,
    ctx: &ExecutionContext,
    sampler: &dyn Sampler,
    progress: &dyn ProgressSink,
) -> Result<BatchReport, NsError> {
    let jobs = build_jobs(plan, ctx)?;
    let initializer = OutputAreaInitializer::for_jobs(&jobs);
    let completed: BTreeSet<String> = FailureCoordinator::new(ctx).setup(|| {
        create_dir_tolerant(&plan.settings.base_dir)?;
        initializer.ensure()?;
        Ok(completed_roots(&jobs, plan.clean))
    })?;

    let opts = DispatchOpts {
        workers: plan.workers,
        clean: plan.clean,
    };
    let dispatcher = Dispatcher::new(ctx, opts, progress);
    if ctx.is_coordinator() {
        tracing::info!(
            batch = %plan.name,
            jobs = jobs.len(),
            skipped = completed.len(),
            workers = dispatcher.effective_workers(),
            processes = ctx.size(),
            "dispatching batch"
        );
    }
    let coordinator = DynamicRunCoordinator::new(sampler, plan.dynamic.keep_intermediate);
    let records = dispatcher
        .dispatch_with(&jobs, &completed, &coordinator)
        .and_then(|own| exchange_records(ctx, &jobs, own));
    let records = match records {
        Ok(records) => records,
        Err(err) => {
            if ctx.is_multi_process() && !err.is_abort() {
                ctx.abort(ABORT_EXIT_STATUS);
            }
            return Err(err);
        }
    };

    let report = BatchReport::from_records(plan.plan_hash()?, records, ctx.size());
    if ctx.is_coordinator() {
        let path = report_path(plan);
        report.write(&path)?;
        let (success, skipped, failed) = report.totals();
        tracing::info!(
            report = %path.display(),
            success,
            skipped,
            failed,
            "batch finished"
        );
    }
    Ok(report)
}
