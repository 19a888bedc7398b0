use nsrun_core::errors::NsError;

use crate::job::JobSpec;
use crate::sampler::{RunArtifact, Sampler};

/// Executes one job to completion.
pub trait JobRunner: Send + Sync {
    /// Runs `job` and returns its final artefact.
    fn run_job(&self, job: &JobSpec) -> Result<RunArtifact, NsError>;
}

/// Runs every job as one constant-nlive sampler invocation.
pub struct SinglePhaseRunner<'s> {
    sampler: &'s dyn Sampler,
}

impl<'s> SinglePhaseRunner<'s> {
    /// Runner delegating to `sampler`.
    pub fn new(sampler: &'s dyn Sampler) -> Self {
        Self { sampler }
    }
}

impl JobRunner for SinglePhaseRunner<'_> {
    fn run_job(&self, job: &JobSpec) -> Result<RunArtifact, NsError> {
        self.sampler
            .run(&job.settings, job.seed.seed, &job.file_root, &job.output_dir)
    }
}
