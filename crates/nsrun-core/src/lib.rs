#![deny(missing_docs)]
#![doc = "Core error, seeding and capability types shared by the nsrun batch scheduler."]

pub mod errors;
pub mod provenance;
pub mod rng;

pub use errors::{ErrorInfo, NsError, ABORT_EXIT_STATUS};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{RngHandle, UNSEEDED};

/// Log-likelihood capability consumed by samplers.
pub trait Likelihood: Send + Sync {
    /// Number of parameters the likelihood expects.
    fn ndim(&self) -> usize;

    /// Evaluates the natural log-likelihood at a physical-space point.
    fn evaluate(&self, theta: &[f64]) -> f64;

    /// Short identifier used when naming file roots.
    fn name(&self) -> &str;
}

/// Prior capability mapping the unit hypercube onto physical space.
pub trait Prior: Send + Sync {
    /// Transforms a unit-cube point into a physical-space point.
    fn sample_from_prior(&self, cube: &[f64]) -> Vec<f64>;

    /// Short identifier used when naming file roots.
    fn name(&self) -> &str;
}
