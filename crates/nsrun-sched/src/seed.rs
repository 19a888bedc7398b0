use std::fmt;
use std::sync::Arc;

use nsrun_core::errors::{ErrorInfo, NsError};
use nsrun_core::rng::UNSEEDED;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;

/// Width of the zero-padded ordinal suffix appended to file roots.
pub const ORDINAL_WIDTH: usize = 3;

/// How job seeds are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedPolicy {
    /// `seed = ordinal * multiplier`; requires isolated single-process jobs.
    DeterministicPerJob,
    /// Every job is unseeded; reproducibility is not guaranteed.
    NonDeterministic,
    /// Seeds come from a scheme supplied by the cooperating processes.
    ExternallyCoordinated,
}

impl SeedPolicy {
    /// Deterministic seeding for a lone process, unseeded otherwise.
    pub fn for_context(ctx: &ExecutionContext) -> Self {
        if ctx.is_multi_process() {
            SeedPolicy::NonDeterministic
        } else {
            SeedPolicy::DeterministicPerJob
        }
    }

    /// Rejects policies the concurrency mode cannot honour.
    pub fn validate(&self, ctx: &ExecutionContext) -> Result<(), NsError> {
        if *self == SeedPolicy::DeterministicPerJob && ctx.is_multi_process() {
            return Err(NsError::Config(
                ErrorInfo::new(
                    "seed_policy_concurrency",
                    "deterministic seeding is unavailable when ranks interleave random draws",
                )
                .with_context("processes", ctx.size().to_string())
                .with_hint("use non-deterministic or externally-coordinated seeding"),
            ));
        }
        Ok(())
    }
}

/// Seed source provided by a communicator-aware front end.
pub trait ExternalSeedScheme: Send + Sync {
    /// Seed for the job with the given ordinal.
    fn seed_for(&self, ordinal: u64) -> i64;
}

impl<F> ExternalSeedScheme for F
where
    F: Fn(u64) -> i64 + Send + Sync,
{
    fn seed_for(&self, ordinal: u64) -> i64 {
        self(ordinal)
    }
}

/// Seed and file-root suffix assigned to one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAssignment {
    /// Seed handed to the sampler ([`UNSEEDED`] for entropy).
    pub seed: i64,
    /// Zero-padded ordinal suffix, e.g. `"007"`.
    pub suffix: String,
    /// Offset added to the seed for each later phase of a dynamic run.
    pub increment: i64,
}

impl SeedAssignment {
    /// Seed for phase `phase` (0 = exploration, 1 = allocation).
    pub fn phase_seed(&self, phase: u32) -> i64 {
        if !self.is_seeded() || (phase > 0 && self.increment < 0) {
            return UNSEEDED;
        }
        self.seed
            .checked_add(self.increment.saturating_mul(i64::from(phase)))
            .unwrap_or(UNSEEDED)
    }

    /// Whether the job's random sequence is reproducible.
    pub fn is_seeded(&self) -> bool {
        self.seed >= 0
    }
}

/// Stamps seeds and ordinal suffixes onto jobs.
#[derive(Clone)]
pub struct SeedAssigner {
    policy: SeedPolicy,
    multiplier: u64,
    increment: i64,
    external: Option<Arc<dyn ExternalSeedScheme>>,
}

impl fmt::Debug for SeedAssigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedAssigner")
            .field("policy", &self.policy)
            .field("multiplier", &self.multiplier)
            .field("increment", &self.increment)
            .field("external", &self.external.is_some())
            .finish()
    }
}

impl SeedAssigner {
    /// Creates an assigner with the given policy and multiplier.
    pub fn new(policy: SeedPolicy, multiplier: u64) -> Self {
        Self {
            policy,
            multiplier,
            increment: 1,
            external: None,
        }
    }

    /// Sets the per-phase seed increment.
    pub fn with_increment(mut self, increment: i64) -> Self {
        self.increment = increment;
        self
    }

    /// Installs the scheme used by [`SeedPolicy::ExternallyCoordinated`].
    pub fn with_external(mut self, scheme: Arc<dyn ExternalSeedScheme>) -> Self {
        self.external = Some(scheme);
        self
    }

    /// Active policy.
    pub fn policy(&self) -> SeedPolicy {
        self.policy
    }

    /// Derives the seed and suffix for `ordinal`.
    pub fn assign(&self, ordinal: u64) -> Result<SeedAssignment, NsError> {
        let (seed, increment) = match self.policy {
            SeedPolicy::DeterministicPerJob => {
                let seed = ordinal
                    .checked_mul(self.multiplier)
                    .and_then(|seed| i64::try_from(seed).ok())
                    .ok_or_else(|| {
                        NsError::Config(
                            ErrorInfo::new("seed_overflow", "ordinal * multiplier overflows")
                                .with_context("ordinal", ordinal.to_string())
                                .with_context("multiplier", self.multiplier.to_string()),
                        )
                    })?;
                (seed, self.increment)
            }
            SeedPolicy::NonDeterministic => (UNSEEDED, -1),
            SeedPolicy::ExternallyCoordinated => {
                let scheme = self.external.as_ref().ok_or_else(|| {
                    NsError::config(
                        "missing_seed_scheme",
                        "externally coordinated seeding requires a seed scheme",
                    )
                })?;
                (scheme.seed_for(ordinal), self.increment)
            }
        };
        Ok(SeedAssignment {
            seed,
            suffix: format!("{:0width$}", ordinal, width = ORDINAL_WIDTH),
            increment,
        })
    }
}
