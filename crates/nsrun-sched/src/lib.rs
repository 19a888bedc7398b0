#![deny(missing_docs)]
#![doc = "Scheduling core for nested sampling batches: matrix expansion, seeding, dispatch and coordinated abort."]

/// Rank identity, barrier and global abort signal.
pub mod context;
/// Bounded-concurrency dispatch and batch execution.
pub mod dispatch;
/// Two-phase dynamic protocol and importance estimation.
pub mod dynamic;
/// Coordinator-only setup with global abort on failure.
pub mod failure;
/// Canonical hashing helpers.
pub mod hash;
/// Resolved job and method group descriptors.
pub mod job;
/// Cartesian expansion of experiment axes.
pub mod matrix;
/// One-time creation of the shared output tree.
pub mod output;
/// Batch plan schema and loading.
pub mod plan;
/// Progress events and sinks.
pub mod progress;
/// Per-job records and the batch report.
pub mod report;
/// Job runner capability.
pub mod runner;
/// External sampler capability and run artefacts.
pub mod sampler;
/// Seed policies and per-job seed assignment.
pub mod seed;
/// Canonical JSON and YAML serde helpers.
pub mod serde;
/// Sampler settings template.
pub mod settings;

pub use context::{
    AbortSignal, Communicator, ExecutionContext, LocalRank, SingleProcess, COORDINATOR_RANK,
};
pub use dispatch::{completed_roots, report_path, run_batch, DispatchOpts, Dispatcher};
pub use dynamic::{
    allocation_plan, sample_importance, AllocationPlan, DynamicRunCoordinator, ExploredRun,
};
pub use failure::FailureCoordinator;
pub use job::{AllocationBudget, JobSpec, MethodGroup};
pub use matrix::{build_jobs, build_jobs_with, seed_assigner, settings_root, ConfigurationMatrix};
pub use output::{create_dir_tolerant, OutputArea, OutputAreaInitializer};
pub use plan::{load_plan, store_plan, BatchPlan, DynamicSpec, ExperimentAxis, SeedSpec, GOAL_AXIS};
pub use progress::{ChannelProgress, NoProgress, ProgressEvent, ProgressSink, TracingProgress};
pub use report::{BatchReport, GroupReport, JobOutcome, JobRecord, REPORT_FILE};
pub use runner::{JobRunner, SinglePhaseRunner};
pub use sampler::{LivePointSchedule, Phase, PhaseRequest, RunArtifact, Sampler, ScheduleStep};
pub use seed::{ExternalSeedScheme, SeedAssigner, SeedAssignment, SeedPolicy, ORDINAL_WIDTH};
pub use settings::SamplerSettings;
