use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use nsrun_core::errors::{ErrorInfo, NsError};
use nsrun_core::provenance::{RunProvenance, SchemaVersion};

use crate::serde::{from_json_slice, to_canonical_json_bytes};

/// File name of the batch report inside the base output directory.
pub const REPORT_FILE: &str = "batch_report.json";

fn io_error(code: &str, err: impl ToString) -> NsError {
    NsError::Serde(ErrorInfo::new(code, err.to_string()))
}

/// Outcome of a single job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum JobOutcome {
    /// The job ran and produced its artefact.
    Success {
        /// Dead points in the final artefact.
        ndead: usize,
        /// Log-evidence estimate, when reported.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        log_evidence: Option<f64>,
    },
    /// A completed artefact already existed and was kept.
    Skipped,
    /// The job failed; siblings were unaffected.
    Failed {
        /// Rendered error.
        reason: String,
    },
}

impl JobOutcome {
    /// Whether the job succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }

    /// Whether the job failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. })
    }
}

/// Result record of one job, keyed by its file root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique output identifier.
    pub file_root: String,
    /// Method group label.
    pub method_group: String,
    /// Repeat ordinal.
    pub ordinal: u64,
    /// Seed handed to the sampler.
    pub seed: i64,
    /// What happened.
    pub outcome: JobOutcome,
}

/// Per-method-group summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    /// Method group label.
    pub method_group: String,
    /// Jobs in the group.
    pub total: usize,
    /// Successful jobs.
    pub success: usize,
    /// Skipped jobs.
    pub skipped: usize,
    /// Failed jobs.
    pub failed: usize,
    /// Failure reasons keyed by file root.
    pub failures: BTreeMap<String, String>,
    /// Job records in matrix order.
    pub jobs: Vec<JobRecord>,
}

/// Completion report of a whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Stable hash of the plan.
    pub plan_hash: String,
    /// Groups in matrix order.
    pub groups: Vec<GroupReport>,
    /// Provenance of the run.
    pub provenance: RunProvenance,
}

impl BatchReport {
    /// Aggregates records (already in matrix order) into a report.
    pub fn from_records(
        plan_hash: impl Into<String>,
        records: Vec<JobRecord>,
        process_count: usize,
    ) -> Self {
        let plan_hash = plan_hash.into();
        let deterministic = !records.is_empty() && records.iter().all(|record| record.seed >= 0);
        let mut groups: Vec<GroupReport> = Vec::new();
        for record in records {
            let position = match groups
                .iter()
                .position(|group| group.method_group == record.method_group)
            {
                Some(position) => position,
                None => {
                    groups.push(GroupReport {
                        method_group: record.method_group.clone(),
                        total: 0,
                        success: 0,
                        skipped: 0,
                        failed: 0,
                        failures: BTreeMap::new(),
                        jobs: Vec::new(),
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[position];
            group.total += 1;
            match &record.outcome {
                JobOutcome::Success { .. } => group.success += 1,
                JobOutcome::Skipped => group.skipped += 1,
                JobOutcome::Failed { reason } => {
                    group.failed += 1;
                    group
                        .failures
                        .insert(record.file_root.clone(), reason.clone());
                }
            }
            group.jobs.push(record);
        }

        let mut tool_versions = BTreeMap::new();
        tool_versions.insert(
            "nsrun-sched".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        let provenance = RunProvenance {
            input_hash: plan_hash.clone(),
            schema: SchemaVersion::default(),
            process_count,
            deterministic,
            created_at: Utc::now().to_rfc3339(),
            tool_versions,
        };
        Self {
            plan_hash,
            groups,
            provenance,
        }
    }

    /// `(success, skipped, failed)` across every group.
    pub fn totals(&self) -> (usize, usize, usize) {
        self.groups.iter().fold((0, 0, 0), |acc, group| {
            (
                acc.0 + group.success,
                acc.1 + group.skipped,
                acc.2 + group.failed,
            )
        })
    }

    /// Every job record in matrix order.
    pub fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.groups.iter().flat_map(|group| group.jobs.iter())
    }

    /// Writes the report as canonical JSON.
    pub fn write(&self, path: &Path) -> Result<(), NsError> {
        let bytes = to_canonical_json_bytes(self)?;
        fs::write(path, bytes).map_err(|err| io_error("report_write", err))
    }

    /// Reads a report written by [`BatchReport::write`].
    pub fn load(path: &Path) -> Result<Self, NsError> {
        let bytes = fs::read(path).map_err(|err| io_error("report_read", err))?;
        from_json_slice(&bytes)
    }

    /// Human readable per-group summary.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        for group in &self.groups {
            let _ = writeln!(
                out,
                "{}: {} success, {} skipped, {} failed (of {})",
                group.method_group, group.success, group.skipped, group.failed, group.total
            );
            for (file_root, reason) in &group.failures {
                let _ = writeln!(out, "  {file_root}: {reason}");
            }
        }
        let (success, skipped, failed) = self.totals();
        let _ = writeln!(
            out,
            "total: {success} success, {skipped} skipped, {failed} failed"
        );
        out
    }
}
