use nsrun_core::errors::{ErrorInfo, NsError};

use crate::job::{AllocationBudget, JobSpec};
use crate::runner::JobRunner;
use crate::sampler::{LivePointSchedule, Phase, PhaseRequest, RunArtifact, Sampler};

fn phase_error(code: &str, message: impl Into<String>, run: &RunArtifact) -> NsError {
    NsError::Phase(
        ErrorInfo::new(code, message).with_context("file_root", run.file_root.clone()),
    )
}

/// Relative importance of every dead point of an exploratory run.
///
/// `goal = 0` weights by the remaining evidence mass above each contour,
/// `goal = 1` by the posterior mass of the point, values in between mix the
/// two normalised terms. The result is scaled so its maximum is one.
pub fn sample_importance(run: &RunArtifact, goal: f64) -> Result<Vec<f64>, NsError> {
    if run.logl.is_empty() {
        return Err(phase_error(
            "exploration_empty",
            "exploration produced no dead points",
            run,
        ));
    }
    if run.logl.len() != run.nlive.len() || run.nlive.contains(&0) {
        return Err(phase_error(
            "malformed_exploration",
            "dead points and live-point counts do not line up",
            run,
        ));
    }

    let mut log_x = 0.0_f64;
    let mut logw = Vec::with_capacity(run.logl.len());
    for (logl, &nlive) in run.logl.iter().zip(&run.nlive) {
        let n = nlive as f64;
        let shrink = (n / (n + 1.0)).ln();
        // width of the shell between X_{i-1} and X_i
        logw.push(logl + log_x + (-shrink.exp()).ln_1p());
        log_x += shrink;
    }
    let max_logw = logw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max_logw.is_finite() {
        return Err(phase_error(
            "degenerate_exploration",
            "exploration weights are not finite",
            run,
        ));
    }
    let w_rel: Vec<f64> = logw.iter().map(|w| (w - max_logw).exp()).collect();

    let total: f64 = w_rel.iter().sum();
    let mut cumulative = 0.0;
    let z_term: Vec<f64> = w_rel
        .iter()
        .zip(&run.nlive)
        .map(|(w, &nlive)| {
            cumulative += w;
            (total - cumulative).max(0.0) / nlive as f64
        })
        .collect();

    let z_sum: f64 = z_term.iter().sum();
    let p_sum: f64 = w_rel.iter().sum();
    let mixed: Vec<f64> = z_term
        .iter()
        .zip(&w_rel)
        .map(|(z, p)| {
            let mut value = 0.0;
            if z_sum > 0.0 {
                value += (1.0 - goal) * z / z_sum;
            }
            if p_sum > 0.0 {
                value += goal * p / p_sum;
            }
            value
        })
        .collect();
    let peak = mixed.iter().copied().fold(0.0_f64, f64::max);
    if !(peak > 0.0 && peak.is_finite()) {
        return Err(phase_error(
            "degenerate_exploration",
            "importance vanishes everywhere",
            run,
        ));
    }
    Ok(mixed.into_iter().map(|value| value / peak).collect())
}

/// Inputs of the allocation phase derived from an exploratory run.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    /// Non-uniform live-point schedule over the exploration's contours.
    pub schedule: LivePointSchedule,
    /// Samples the allocation phase may draw.
    pub max_samples: u64,
    /// Exploration dead-point index the allocation phase resumes from.
    pub resume_from: u64,
}

/// Turns importance weights into a schedule fitting the remaining budget.
///
/// The total budget is `max_total_samples` when set, otherwise the sample
/// count a constant run with `nlive_const` live points would produce.
pub fn allocation_plan(
    run: &RunArtifact,
    importance: &[f64],
    budget: &AllocationBudget,
) -> Result<AllocationPlan, NsError> {
    if importance.len() != run.logl.len() {
        return Err(phase_error(
            "malformed_exploration",
            "importance does not cover every dead point",
            run,
        ));
    }
    let ndead_init = run.ndead() as u64;
    let total = budget.max_total_samples.unwrap_or_else(|| {
        let ninit = budget.initial_live_points.max(1);
        budget.nlive_const.saturating_mul(ndead_init) / ninit
    });
    let remaining = total.saturating_sub(ndead_init);
    if remaining == 0 {
        return Err(NsError::Phase(
            ErrorInfo::new(
                "budget_exhausted",
                "exploration used the whole sample budget",
            )
            .with_context("file_root", run.file_root.clone())
            .with_context("total", total.to_string())
            .with_context("ndead_init", ndead_init.to_string()),
        ));
    }

    let density: f64 = importance
        .iter()
        .zip(&run.nlive)
        .map(|(imp, &nlive)| imp / nlive as f64)
        .sum();
    let scale = remaining as f64 / density;
    let nlives: Vec<u64> = importance
        .iter()
        .map(|imp| ((imp * scale).round() as u64).max(1))
        .collect();

    let first_raised = nlives
        .iter()
        .position(|&nlive| nlive > budget.initial_live_points)
        .unwrap_or(0) as u64;
    let resume_from = match budget.initial_step_size {
        0 => 0,
        step => first_raised / step * step,
    };
    let schedule =
        LivePointSchedule::from_points(run.logl.iter().copied().zip(nlives.iter().copied()));
    Ok(AllocationPlan {
        schedule,
        max_samples: remaining,
        resume_from,
    })
}

/// Exploration artefact of a job whose first phase succeeded.
///
/// Only [`DynamicRunCoordinator::explore`] creates this value, so the
/// allocation phase cannot be sequenced after a failed exploration.
#[derive(Debug, Clone)]
pub struct ExploredRun {
    artifact: RunArtifact,
    goal: f64,
}

impl ExploredRun {
    /// Artefact written by the exploration phase.
    pub fn artifact(&self) -> &RunArtifact {
        &self.artifact
    }

    /// Allocation goal the run was explored for.
    pub fn goal(&self) -> f64 {
        self.goal
    }
}

/// Sequences the exploration and allocation phases of dynamic jobs.
///
/// Goal-disabled jobs run as a single constant-nlive invocation.
pub struct DynamicRunCoordinator<'s> {
    sampler: &'s dyn Sampler,
    keep_intermediate: bool,
}

impl<'s> DynamicRunCoordinator<'s> {
    /// Coordinator driving `sampler`.
    pub fn new(sampler: &'s dyn Sampler, keep_intermediate: bool) -> Self {
        Self {
            sampler,
            keep_intermediate,
        }
    }

    /// Runs the exploration phase with `ninit` live points.
    pub fn explore(&self, job: &JobSpec) -> Result<ExploredRun, NsError> {
        let Some(goal) = job.budget.allocation_goal else {
            return Err(NsError::Phase(
                ErrorInfo::new("goal_disabled", "job has no allocation phase")
                    .with_context("file_root", job.file_root.clone()),
            ));
        };
        let mut settings = job.settings.clone();
        settings.nlive = job.budget.initial_live_points;
        settings.write_resume = job.budget.initial_step_size > 0;
        let schedule = LivePointSchedule::constant(job.budget.initial_live_points);
        let file_root = job.phase_root(Phase::Exploration.root_tag());
        let seed = job.seed.phase_seed(Phase::Exploration.index());
        tracing::debug!(
            file_root = %file_root,
            seed,
            ninit = job.budget.initial_live_points,
            "starting exploration phase"
        );
        let request = PhaseRequest {
            phase: Phase::Exploration,
            settings: &settings,
            seed,
            file_root: &file_root,
            output_dir: &job.output_dir,
            schedule: &schedule,
            max_samples: job.budget.max_total_samples,
            resume_every: Some(job.budget.initial_step_size).filter(|step| *step > 0),
            resume_from: None,
            prior: None,
        };
        let artifact = self.sampler.run_phase(&request)?;
        Ok(ExploredRun { artifact, goal })
    }

    /// Runs the allocation phase and merges both phases into the job's artefact.
    pub fn allocate(&self, job: &JobSpec, explored: ExploredRun) -> Result<RunArtifact, NsError> {
        let exploration = &explored.artifact;
        let retained = |err: NsError| {
            err.with_context(
                "retained_exploration",
                RunArtifact::completion_marker(&exploration.output_dir, &exploration.file_root)
                    .display()
                    .to_string(),
            )
        };
        let importance = sample_importance(exploration, explored.goal).map_err(retained)?;
        let plan = allocation_plan(exploration, &importance, &job.budget).map_err(retained)?;

        let mut settings = job.settings.clone();
        settings.nlive = plan.schedule.peak();
        let file_root = job.phase_root(Phase::Allocation.root_tag());
        let seed = job.seed.phase_seed(Phase::Allocation.index());
        tracing::debug!(
            file_root = %file_root,
            seed,
            max_samples = plan.max_samples,
            resume_from = plan.resume_from,
            peak_nlive = plan.schedule.peak(),
            "starting allocation phase"
        );
        let request = PhaseRequest {
            phase: Phase::Allocation,
            settings: &settings,
            seed,
            file_root: &file_root,
            output_dir: &job.output_dir,
            schedule: &plan.schedule,
            max_samples: Some(plan.max_samples),
            resume_every: None,
            resume_from: Some(plan.resume_from),
            prior: Some(exploration),
        };
        let allocation = self.sampler.run_phase(&request).map_err(retained)?;
        let merged = self
            .sampler
            .merge(exploration, &allocation, &job.file_root, &job.output_dir)
            .map_err(retained)?;
        if !self.keep_intermediate {
            exploration.remove_files();
            allocation.remove_files();
        }
        Ok(merged)
    }
}

impl JobRunner for DynamicRunCoordinator<'_> {
    fn run_job(&self, job: &JobSpec) -> Result<RunArtifact, NsError> {
        if !job.budget.is_dynamic() {
            tracing::debug!(file_root = %job.file_root, seed = job.seed.seed, "single-phase run");
            return self
                .sampler
                .run(&job.settings, job.seed.seed, &job.file_root, &job.output_dir);
        }
        let explored = self.explore(job)?;
        self.allocate(job, explored)
    }
}
