use std::fs;
use std::path::Path;

use nsrun_core::errors::{ErrorInfo, NsError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::stable_hash_string;
use crate::seed::SeedPolicy;
use crate::serde::{from_yaml_slice, to_yaml_string};
use crate::settings::SamplerSettings;

/// Name of the setting axis selecting the allocation goal of a method group.
pub const GOAL_AXIS: &str = "dynamic_goal";

fn io_error(code: &str, err: impl ToString) -> NsError {
    NsError::Serde(ErrorInfo::new(code, err.to_string()))
}

/// One dimension of variation swept by a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExperimentAxis {
    /// Overrides the named setting with each value in turn.
    Setting {
        /// Setting key (or [`GOAL_AXIS`]).
        name: String,
        /// Ordered values to sweep.
        values: Vec<Value>,
    },
    /// Repeats every setting combination `count` times with consecutive ordinals.
    Repeat {
        /// First ordinal; batches may skip 0 or resume at an offset.
        start: u64,
        /// Number of repeats.
        count: u64,
    },
}

impl ExperimentAxis {
    /// Convenience constructor for a setting axis.
    pub fn setting(name: impl Into<String>, values: Vec<Value>) -> Self {
        ExperimentAxis::Setting {
            name: name.into(),
            values,
        }
    }

    /// Convenience constructor for a repeat axis.
    pub fn repeat(start: u64, count: u64) -> Self {
        ExperimentAxis::Repeat { start, count }
    }
}

/// Seed derivation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSpec {
    /// Explicit policy; chosen from the execution context when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<SeedPolicy>,
    /// Multiplier applied to ordinals under deterministic seeding.
    #[serde(default = "SeedSpec::default_multiplier")]
    pub multiplier: u64,
}

impl SeedSpec {
    fn default_multiplier() -> u64 {
        1000
    }
}

impl Default for SeedSpec {
    fn default() -> Self {
        Self {
            policy: None,
            multiplier: Self::default_multiplier(),
        }
    }
}

/// Settings for the two-phase dynamic protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSpec {
    /// Live points used by the exploration phase.
    #[serde(default = "DynamicSpec::default_ninit")]
    pub ninit: u64,
    /// Dead points between resume snapshots of the exploration phase (defaults to `ninit`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_step: Option<u64>,
    /// Seed offset between consecutive phases; negative disables seeding of later phases.
    #[serde(default = "DynamicSpec::default_seed_increment")]
    pub seed_increment: i64,
    /// Live points of the comparable constant-nlive run (defaults to the group's `nlive`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlive_const: Option<u64>,
    /// Total sample cap for dynamic jobs; standard jobs become unbounded when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ndead: Option<u64>,
    /// Keep the per-phase artefacts after a successful merge.
    #[serde(default)]
    pub keep_intermediate: bool,
}

impl DynamicSpec {
    fn default_ninit() -> u64 {
        20
    }

    fn default_seed_increment() -> i64 {
        1
    }

    /// Resolved exploration step size.
    pub fn init_step(&self) -> u64 {
        self.init_step.unwrap_or(self.ninit)
    }
}

impl Default for DynamicSpec {
    fn default() -> Self {
        Self {
            ninit: Self::default_ninit(),
            init_step: None,
            seed_increment: Self::default_seed_increment(),
            nlive_const: None,
            max_ndead: None,
            keep_intermediate: false,
        }
    }
}

/// Complete description of a batch of sampling jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    /// Problem label used as the leading part of every file root.
    pub name: String,
    /// Settings template shared by all jobs.
    #[serde(default)]
    pub settings: SamplerSettings,
    /// Ordered axes; the repeat axis, when present, must be last.
    #[serde(default)]
    pub axes: Vec<ExperimentAxis>,
    /// Seed derivation configuration.
    #[serde(default)]
    pub seed: SeedSpec,
    /// Dynamic protocol settings.
    #[serde(default)]
    pub dynamic: DynamicSpec,
    /// Worker slots used by the dispatcher in a single-process context.
    #[serde(default = "BatchPlan::default_workers")]
    pub workers: usize,
    /// Re-run jobs whose artefacts already exist.
    #[serde(default)]
    pub clean: bool,
}

impl BatchPlan {
    fn default_workers() -> usize {
        1
    }

    /// Creates a plan with default settings and no axes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: SamplerSettings::default(),
            axes: Vec::new(),
            seed: SeedSpec::default(),
            dynamic: DynamicSpec::default(),
            workers: Self::default_workers(),
            clean: false,
        }
    }

    /// Returns the deterministic hash associated with the plan contents.
    pub fn plan_hash(&self) -> Result<String, NsError> {
        stable_hash_string(self)
    }

    /// Produces a YAML representation of the plan.
    pub fn to_yaml_string(&self) -> Result<String, NsError> {
        to_yaml_string(self)
    }

    /// Checks the plan-level invariants that do not depend on axis expansion.
    pub fn validate(&self) -> Result<(), NsError> {
        if self.name.trim().is_empty() {
            return Err(NsError::config("empty_name", "batch name must not be empty"));
        }
        if self.workers == 0 {
            return Err(NsError::config("zero_workers", "workers must be at least 1"));
        }
        if self.dynamic.ninit == 0 {
            return Err(NsError::config("zero_ninit", "dynamic.ninit must be at least 1"));
        }
        if !self.settings.write_stats {
            return Err(stats_required());
        }
        if self.seed.multiplier == 0 {
            return Err(NsError::config(
                "zero_multiplier",
                "seed.multiplier must be positive so seeds stay distinct",
            ));
        }
        Ok(())
    }
}

/// The stats file is the completion marker skip-existing relies on.
pub(crate) fn stats_required() -> NsError {
    NsError::Config(
        ErrorInfo::new(
            "stats_required",
            "write_stats must stay enabled: the stats file marks a completed run",
        )
        .with_hint("remove the write_stats override"),
    )
}

/// Loads a batch plan from a YAML file.
pub fn load_plan<P: AsRef<Path>>(path: P) -> Result<BatchPlan, NsError> {
    let plan_path = path.as_ref();
    let bytes = fs::read(plan_path).map_err(|err| {
        NsError::Serde(
            ErrorInfo::new("plan_read", err.to_string())
                .with_context("path", plan_path.display().to_string()),
        )
    })?;
    let plan: BatchPlan = from_yaml_slice(&bytes)?;
    plan.validate()?;
    Ok(plan)
}

/// Writes a plan to disk as YAML.
pub fn store_plan<P: AsRef<Path>>(plan: &BatchPlan, path: P) -> Result<(), NsError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| io_error("plan_dir", err))?;
    }
    fs::write(path, plan.to_yaml_string()?).map_err(|err| io_error("plan_write", err))
}
