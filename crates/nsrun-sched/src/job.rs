use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::seed::SeedAssignment;
use crate::settings::SamplerSettings;

/// Resource budget of the two-phase dynamic protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationBudget {
    /// Live points of the exploration phase.
    pub initial_live_points: u64,
    /// Dead points between exploration resume snapshots.
    pub initial_step_size: u64,
    /// Allocation goal in `[0, 1]`; `None` disables the second phase.
    pub allocation_goal: Option<f64>,
    /// Total sample cap across both phases.
    pub max_total_samples: Option<u64>,
    /// Live points of the comparable constant-nlive run.
    pub nlive_const: u64,
}

impl AllocationBudget {
    /// Whether the job runs the two-phase protocol.
    pub fn is_dynamic(&self) -> bool {
        self.allocation_goal.is_some()
    }
}

/// A settings combination produced by the configuration matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodGroup {
    /// Position of the group in matrix order.
    pub index: usize,
    /// Human readable label, e.g. `dg=0.25`.
    pub label: String,
    /// Per-axis override values in axis order.
    pub overrides: Vec<(String, Value)>,
    /// Settings after overrides.
    pub settings: SamplerSettings,
    /// Dynamic budget shared by the group's jobs.
    pub budget: AllocationBudget,
    /// Settings-derived file-root prefix.
    pub root_prefix: String,
}

/// One fully resolved job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Position in batch order.
    pub position: usize,
    /// Index of the owning method group.
    pub group_index: usize,
    /// Label of the owning method group.
    pub method_group: String,
    /// Repeat ordinal within the group.
    pub ordinal: u64,
    /// Per-axis override values.
    pub overrides: Vec<(String, Value)>,
    /// Deep copy of the template with overrides applied.
    pub settings: SamplerSettings,
    /// Dynamic budget.
    pub budget: AllocationBudget,
    /// Assigned seed.
    pub seed: SeedAssignment,
    /// Unique output identifier.
    pub file_root: String,
    /// Directory receiving the job's files.
    pub output_dir: PathBuf,
}

impl JobSpec {
    /// File root for an intermediate phase artefact.
    pub fn phase_root(&self, tag: &str) -> String {
        format!("{}_{}", self.file_root, tag)
    }
}
