use std::fs;
use std::path::{Path, PathBuf};

use nsrun_core::errors::NsError;
use serde::{Deserialize, Serialize};

use crate::settings::SamplerSettings;

/// Extension of the stats file whose presence marks a completed run.
pub const STATS_EXTENSION: &str = "stats";

/// Output of one sampler invocation.
///
/// The scheduler only inspects the location, the dead-point likelihood
/// sequence (for importance estimation) and the list of written files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    /// Directory holding the artefact files.
    pub output_dir: PathBuf,
    /// Identifier the files are named after.
    pub file_root: String,
    /// Seed the run used.
    pub seed: i64,
    /// Log-likelihoods of the dead points in the order they died.
    #[serde(default)]
    pub logl: Vec<f64>,
    /// Number of live points when each dead point died.
    #[serde(default)]
    pub nlive: Vec<u64>,
    /// Log-evidence estimate, when the sampler reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_evidence: Option<f64>,
    /// Files written by the run.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl RunArtifact {
    /// Empty artefact for a location.
    pub fn new(output_dir: impl Into<PathBuf>, file_root: impl Into<String>, seed: i64) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_root: file_root.into(),
            seed,
            logl: Vec::new(),
            nlive: Vec::new(),
            log_evidence: None,
            files: Vec::new(),
        }
    }

    /// Number of dead points.
    pub fn ndead(&self) -> usize {
        self.logl.len()
    }

    /// Path of the completion marker for a location.
    pub fn completion_marker(output_dir: &Path, file_root: &str) -> PathBuf {
        output_dir.join(format!("{file_root}.{STATS_EXTENSION}"))
    }

    /// Whether a completed artefact already exists at the location.
    pub fn is_complete(output_dir: &Path, file_root: &str) -> bool {
        Self::completion_marker(output_dir, file_root).is_file()
    }

    /// Deletes the artefact's files; missing files are ignored.
    pub fn remove_files(&self) {
        for file in &self.files {
            let _ = fs::remove_file(file);
        }
    }
}

/// One change point of a live-point schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStep {
    /// Log-likelihood from which the step applies.
    pub logl: f64,
    /// Live points to hold from that likelihood onward.
    pub nlive: u64,
}

/// Non-uniform live-point allocation keyed by likelihood contour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePointSchedule {
    /// Live points below the first step.
    pub initial: u64,
    /// Change points sorted by increasing log-likelihood.
    pub steps: Vec<ScheduleStep>,
}

impl LivePointSchedule {
    /// A constant schedule.
    pub fn constant(nlive: u64) -> Self {
        Self {
            initial: nlive,
            steps: Vec::new(),
        }
    }

    /// Builds a schedule from per-contour live-point counts, merging runs of
    /// equal values.
    pub fn from_points(points: impl IntoIterator<Item = (f64, u64)>) -> Self {
        let mut iter = points.into_iter();
        let Some((_, initial)) = iter.next() else {
            return Self::constant(0);
        };
        let mut current = initial;
        let mut steps = Vec::new();
        for (logl, nlive) in iter {
            if nlive != current {
                steps.push(ScheduleStep { logl, nlive });
                current = nlive;
            }
        }
        Self { initial, steps }
    }

    /// Live points to hold at likelihood `logl`.
    pub fn nlive_at(&self, logl: f64) -> u64 {
        self.steps
            .iter()
            .take_while(|step| step.logl <= logl)
            .last()
            .map_or(self.initial, |step| step.nlive)
    }

    /// Largest live-point count anywhere in the schedule.
    pub fn peak(&self) -> u64 {
        self.steps
            .iter()
            .map(|step| step.nlive)
            .fold(self.initial, u64::max)
    }
}

/// Which half of a dynamic run a phase invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Exploratory run with `ninit` live points.
    Exploration,
    /// Importance-driven run with a non-uniform schedule.
    Allocation,
}

impl Phase {
    /// Index used for seed derivation.
    pub fn index(self) -> u32 {
        match self {
            Phase::Exploration => 0,
            Phase::Allocation => 1,
        }
    }

    /// Suffix appended to the job's file root for the phase artefact.
    pub fn root_tag(self) -> &'static str {
        match self {
            Phase::Exploration => "init",
            Phase::Allocation => "dyn",
        }
    }
}

/// Arguments of a single phase invocation.
#[derive(Debug, Clone)]
pub struct PhaseRequest<'a> {
    /// Phase being run.
    pub phase: Phase,
    /// Job settings.
    pub settings: &'a SamplerSettings,
    /// Seed for this phase.
    pub seed: i64,
    /// File root of the phase artefact.
    pub file_root: &'a str,
    /// Output directory.
    pub output_dir: &'a Path,
    /// Live-point schedule to follow.
    pub schedule: &'a LivePointSchedule,
    /// Sample cap for the phase.
    pub max_samples: Option<u64>,
    /// Dead points between resume snapshots.
    pub resume_every: Option<u64>,
    /// Dead-point index of the prior run to resume from.
    pub resume_from: Option<u64>,
    /// Artefact of the previous phase.
    pub prior: Option<&'a RunArtifact>,
}

/// External sampler capability.
pub trait Sampler: Send + Sync {
    /// Runs a constant-nlive nested sampling run.
    fn run(
        &self,
        settings: &SamplerSettings,
        seed: i64,
        file_root: &str,
        output_dir: &Path,
    ) -> Result<RunArtifact, NsError>;

    /// Runs one phase of a dynamic run.
    fn run_phase(&self, request: &PhaseRequest<'_>) -> Result<RunArtifact, NsError>;

    /// Combines the two phases into the job's final artefact.
    fn merge(
        &self,
        exploration: &RunArtifact,
        allocation: &RunArtifact,
        file_root: &str,
        output_dir: &Path,
    ) -> Result<RunArtifact, NsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_merges_equal_neighbours() {
        let schedule =
            LivePointSchedule::from_points(vec![(-5.0, 10), (-4.0, 10), (-3.0, 40), (-1.0, 5)]);
        assert_eq!(schedule.initial, 10);
        assert_eq!(schedule.steps.len(), 2);
        assert_eq!(schedule.nlive_at(-4.5), 10);
        assert_eq!(schedule.nlive_at(-2.0), 40);
        assert_eq!(schedule.nlive_at(0.0), 5);
        assert_eq!(schedule.peak(), 40);
    }

    #[test]
    fn completion_marker_uses_stats_file() {
        let marker = RunArtifact::completion_marker(Path::new("chains"), "gauss_001");
        assert_eq!(marker, PathBuf::from("chains/gauss_001.stats"));
    }
}
