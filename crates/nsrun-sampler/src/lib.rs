#![deny(missing_docs)]
#![doc = "Reference nested sampler, likelihoods and priors for nsrun batches."]

/// Stats, dead point and posterior files.
pub mod files;
/// Likelihood implementations.
pub mod likelihoods;
/// Prior implementations.
pub mod priors;
/// Rejection-sampling nested sampler.
pub mod reference;

use nsrun_sched::Sampler;
use serde::{Deserialize, Serialize};

pub use files::{load_points, log_weights, DeadPoint, OutputFlags, RunStats};
pub use reference::{merge_threads, ReferenceSampler, DEFAULT_MAX_ATTEMPTS};

/// Likelihood selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LikelihoodKind {
    /// Unit-width spherical Gaussian.
    Gaussian,
    /// Exponential power likelihood with power 2.
    ExpPower,
    /// Four-component Gaussian mixture.
    GaussianMix,
}

/// Prior selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorKind {
    /// Uniform on `[-scale, scale]`.
    Uniform,
    /// Zero-mean Gaussian of width `scale`.
    Gaussian,
}

/// Boxed reference sampler for a likelihood and prior choice.
pub fn reference_sampler(
    likelihood: LikelihoodKind,
    prior: PriorKind,
    ndim: usize,
    prior_scale: f64,
) -> Box<dyn Sampler> {
    match (likelihood, prior) {
        (LikelihoodKind::Gaussian, PriorKind::Uniform) => Box::new(ReferenceSampler::new(
            likelihoods::Gaussian::new(ndim, 1.0),
            priors::Uniform::symmetric(prior_scale),
        )),
        (LikelihoodKind::Gaussian, PriorKind::Gaussian) => Box::new(ReferenceSampler::new(
            likelihoods::Gaussian::new(ndim, 1.0),
            priors::Gaussian::new(prior_scale),
        )),
        (LikelihoodKind::ExpPower, PriorKind::Uniform) => Box::new(ReferenceSampler::new(
            likelihoods::ExpPower::new(ndim, 1.0, 2.0),
            priors::Uniform::symmetric(prior_scale),
        )),
        (LikelihoodKind::ExpPower, PriorKind::Gaussian) => Box::new(ReferenceSampler::new(
            likelihoods::ExpPower::new(ndim, 1.0, 2.0),
            priors::Gaussian::new(prior_scale),
        )),
        (LikelihoodKind::GaussianMix, PriorKind::Uniform) => Box::new(ReferenceSampler::new(
            likelihoods::GaussianMix::new(ndim),
            priors::Uniform::symmetric(prior_scale),
        )),
        (LikelihoodKind::GaussianMix, PriorKind::Gaussian) => Box::new(ReferenceSampler::new(
            likelihoods::GaussianMix::new(ndim),
            priors::Gaussian::new(prior_scale),
        )),
    }
}
