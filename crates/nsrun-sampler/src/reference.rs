use std::path::Path;

use nsrun_core::errors::{ErrorInfo, NsError};
use nsrun_core::{Likelihood, Prior, RngHandle};
use nsrun_sched::{LivePointSchedule, PhaseRequest, RunArtifact, Sampler, SamplerSettings};
use rand::Rng;

use crate::files::{load_points, write_run, DeadPoint, OutputFlags, RunMeta};

/// Default number of prior draws tried for each replacement point.
pub const DEFAULT_MAX_ATTEMPTS: u64 = 100_000;

#[derive(Debug, Clone)]
struct LivePoint {
    logl: f64,
    theta: Vec<f64>,
}

#[derive(Debug, Clone)]
struct RunInputs<'a> {
    settings: &'a SamplerSettings,
    seed: i64,
    schedule: &'a LivePointSchedule,
    max_samples: Option<u64>,
}

/// Small in-process nested sampler.
///
/// Replacement points are drawn by rejection sampling from the prior, so it
/// is only suitable for low-dimensional problems. Runs are reproducible for a
/// non-negative seed.
#[derive(Debug, Clone)]
pub struct ReferenceSampler<L, P> {
    likelihood: L,
    prior: P,
    max_attempts: u64,
}

impl<L: Likelihood, P: Prior> ReferenceSampler<L, P> {
    /// Sampler over `likelihood` and `prior`.
    pub fn new(likelihood: L, prior: P) -> Self {
        Self {
            likelihood,
            prior,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Caps the prior draws tried per replacement.
    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn meta(&self, seed: i64) -> RunMeta<'_> {
        RunMeta {
            seed,
            likelihood: self.likelihood.name(),
            prior: self.prior.name(),
            ndim: self.likelihood.ndim(),
        }
    }

    fn draw(&self, rng: &mut RngHandle, threshold: f64) -> Option<LivePoint> {
        let ndim = self.likelihood.ndim();
        for _ in 0..self.max_attempts {
            let cube: Vec<f64> = (0..ndim).map(|_| rng.gen::<f64>()).collect();
            let theta = self.prior.sample_from_prior(&cube);
            let logl = self.likelihood.evaluate(&theta);
            if logl > threshold {
                return Some(LivePoint { logl, theta });
            }
        }
        None
    }

    fn nested_run(&self, inputs: &RunInputs<'_>) -> Result<Vec<DeadPoint>, NsError> {
        if self.likelihood.ndim() == 0 {
            return Err(NsError::sampler(
                "zero_dimensions",
                "likelihood has no parameters",
            ));
        }
        let mut rng = RngHandle::for_job_seed(inputs.seed);
        if !rng.is_seeded() {
            tracing::debug!(seed = inputs.seed, "unseeded run, drawing from entropy");
        }
        let mut live = Vec::new();
        for _ in 0..inputs.schedule.initial.max(1) {
            let point = self.draw(&mut rng, f64::NEG_INFINITY).ok_or_else(|| {
                NsError::Sampler(
                    ErrorInfo::new("prior_draw", "no finite likelihood found in the prior")
                        .with_context("likelihood", self.likelihood.name()),
                )
            })?;
            live.push(point);
        }

        let max_ndead = u64::try_from(inputs.settings.max_ndead).ok().filter(|n| *n > 0);
        let cap = match (max_ndead, inputs.max_samples) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let reached = |count: usize| cap.map_or(false, |cap| count as u64 >= cap);
        let log_precision = inputs.settings.precision_criterion.max(f64::MIN_POSITIVE).ln();

        let mut dead = Vec::new();
        let mut log_x = 0.0_f64;
        let mut log_z = f64::NEG_INFINITY;
        while !live.is_empty() && !reached(dead.len()) {
            let worst = live
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.logl.total_cmp(&b.1.logl))
                .map(|(index, _)| index)
                .unwrap_or(0);
            let n = live.len();
            let point = live.swap_remove(worst);
            let shrink = (n as f64 / (n as f64 + 1.0)).ln();
            log_z = log_add_exp(log_z, point.logl + log_x + (-shrink.exp()).ln_1p());
            log_x += shrink;

            let target = inputs.schedule.nlive_at(point.logl).max(1) as usize;
            let wanted = target.saturating_sub(live.len());
            let threshold = point.logl;
            dead.push(DeadPoint {
                logl: point.logl,
                nlive: n as u64,
                theta: point.theta,
            });
            let mut exhausted = false;
            for _ in 0..wanted {
                match self.draw(&mut rng, threshold) {
                    Some(replacement) => live.push(replacement),
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }
            if exhausted {
                tracing::debug!(
                    ndead = dead.len(),
                    threshold,
                    "replacement draws exhausted, terminating"
                );
                break;
            }

            let live_logls: Vec<f64> = live.iter().map(|p| p.logl).collect();
            let log_live = log_sum_exp(&live_logls) - (live.len().max(1) as f64).ln() + log_x;
            if log_z.is_finite() && log_live - log_z < log_precision {
                break;
            }
        }

        live.sort_by(|a, b| a.logl.total_cmp(&b.logl));
        let remaining = live.len();
        for (index, point) in live.into_iter().enumerate() {
            if reached(dead.len()) {
                break;
            }
            dead.push(DeadPoint {
                logl: point.logl,
                nlive: (remaining - index) as u64,
                theta: point.theta,
            });
        }
        Ok(dead)
    }

    fn execute(
        &self,
        inputs: RunInputs<'_>,
        file_root: &str,
        output_dir: &Path,
    ) -> Result<RunArtifact, NsError> {
        let points = self.nested_run(&inputs)?;
        let artifact = write_run(
            output_dir,
            file_root,
            &points,
            OutputFlags::from_settings(inputs.settings),
            &self.meta(inputs.seed),
        )?;
        tracing::debug!(
            file_root,
            seed = inputs.seed,
            ndead = artifact.ndead(),
            log_evidence = artifact.log_evidence.unwrap_or(f64::NAN),
            "run finished"
        );
        Ok(artifact)
    }
}

impl<L: Likelihood, P: Prior> Sampler for ReferenceSampler<L, P> {
    fn run(
        &self,
        settings: &SamplerSettings,
        seed: i64,
        file_root: &str,
        output_dir: &Path,
    ) -> Result<RunArtifact, NsError> {
        let schedule = LivePointSchedule::constant(settings.nlive);
        let inputs = RunInputs {
            settings,
            seed,
            schedule: &schedule,
            max_samples: None,
        };
        self.execute(inputs, file_root, output_dir)
    }

    fn run_phase(&self, request: &PhaseRequest<'_>) -> Result<RunArtifact, NsError> {
        if let Some(resume_from) = request.resume_from {
            // every phase starts from fresh prior draws
            tracing::debug!(
                file_root = request.file_root,
                resume_from,
                "resume point ignored by the reference sampler"
            );
        }
        let inputs = RunInputs {
            settings: request.settings,
            seed: request.seed,
            schedule: request.schedule,
            max_samples: request.max_samples,
        };
        self.execute(inputs, request.file_root, request.output_dir)
    }

    fn merge(
        &self,
        exploration: &RunArtifact,
        allocation: &RunArtifact,
        file_root: &str,
        output_dir: &Path,
    ) -> Result<RunArtifact, NsError> {
        let first = load_points(exploration)?;
        let second = load_points(allocation)?;
        let merged = merge_threads(&first, &second);
        write_run(
            output_dir,
            file_root,
            &merged,
            OutputFlags::detect(exploration),
            &self.meta(exploration.seed),
        )
    }
}

/// Combines two runs into one; each point's live count becomes the sum of
/// both runs' live counts at its contour.
pub fn merge_threads(first: &[DeadPoint], second: &[DeadPoint]) -> Vec<DeadPoint> {
    let mut merged = Vec::with_capacity(first.len() + second.len());
    let (mut i, mut j) = (0, 0);
    while i < first.len() || j < second.len() {
        let take_first = j >= second.len() || (i < first.len() && first[i].logl <= second[j].logl);
        let (point, other) = if take_first {
            i += 1;
            (&first[i - 1], second.get(j))
        } else {
            j += 1;
            (&second[j - 1], first.get(i))
        };
        merged.push(DeadPoint {
            logl: point.logl,
            nlive: point.nlive + other.map_or(0, |p| p.nlive),
            theta: point.theta.clone(),
        });
    }
    merged
}

fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

fn log_sum_exp(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, log_add_exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(logl: f64, nlive: u64) -> DeadPoint {
        DeadPoint {
            logl,
            nlive,
            theta: Vec::new(),
        }
    }

    #[test]
    fn merged_threads_add_live_counts() {
        let first = vec![point(-3.0, 2), point(-1.0, 1)];
        let second = vec![point(-2.0, 3), point(-0.5, 2)];
        let merged = merge_threads(&first, &second);
        let logls: Vec<_> = merged.iter().map(|p| p.logl).collect();
        let nlives: Vec<_> = merged.iter().map(|p| p.nlive).collect();
        assert_eq!(logls, vec![-3.0, -2.0, -1.0, -0.5]);
        assert_eq!(nlives, vec![5, 4, 3, 2]);
    }

    #[test]
    fn log_add_exp_handles_empty_accumulator() {
        assert_eq!(log_add_exp(f64::NEG_INFINITY, -2.0), -2.0);
        assert!((log_add_exp(0.0, 0.0) - 2f64.ln()).abs() < 1e-12);
    }
}
