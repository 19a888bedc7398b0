#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use nsrun_core::errors::NsError;
use nsrun_sched::{
    BatchPlan, ExperimentAxis, Phase, PhaseRequest, RunArtifact, Sampler, SamplerSettings,
};
use serde_json::json;

/// Sampler double that writes a stats marker and counts every call.
#[derive(Default)]
pub struct StubSampler {
    pub runs: AtomicUsize,
    pub explorations: AtomicUsize,
    pub allocations: AtomicUsize,
    pub merges: AtomicUsize,
    pub fail_roots: BTreeSet<String>,
    pub fail_exploration: bool,
    pub fail_allocation: bool,
    pub panic_roots: BTreeSet<String>,
    pub requests: Mutex<Vec<(String, i64, Option<u64>)>>,
    pub delay: Duration,
}

impl StubSampler {
    pub fn failing_on(roots: impl IntoIterator<Item = String>) -> Self {
        Self {
            fail_roots: roots.into_iter().collect(),
            ..Self::default()
        }
    }

    fn write(&self, dir: &Path, root: &str, seed: i64, nlive: u64, ndead: usize) -> RunArtifact {
        let mut artifact = RunArtifact::new(dir, root, seed);
        artifact.logl = (0..ndead).map(|i| -30.0 + i as f64 * 0.25).collect();
        artifact.nlive = vec![nlive.max(1); ndead];
        artifact.log_evidence = Some(-2.5);
        let marker = RunArtifact::completion_marker(dir, root);
        fs::write(&marker, format!("{{\"seed\": {seed}}}")).expect("write marker");
        artifact.files.push(marker);
        artifact
    }
}

impl Sampler for StubSampler {
    fn run(
        &self,
        settings: &SamplerSettings,
        seed: i64,
        file_root: &str,
        output_dir: &Path,
    ) -> Result<RunArtifact, NsError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        if self.panic_roots.contains(file_root) {
            panic!("stub sampler crashed on {file_root}");
        }
        if self.fail_roots.contains(file_root) {
            return Err(NsError::sampler("stub_failure", format!("forced failure on {file_root}")));
        }
        Ok(self.write(output_dir, file_root, seed, settings.nlive, 40))
    }

    fn run_phase(&self, request: &PhaseRequest<'_>) -> Result<RunArtifact, NsError> {
        thread::sleep(self.delay);
        self.requests.lock().expect("lock").push((
            request.file_root.to_string(),
            request.seed,
            request.max_samples,
        ));
        match request.phase {
            Phase::Exploration => {
                self.explorations.fetch_add(1, Ordering::SeqCst);
                if self.fail_exploration {
                    return Err(NsError::sampler("stub_exploration", "exploration crashed"));
                }
                Ok(self.write(
                    request.output_dir,
                    request.file_root,
                    request.seed,
                    request.schedule.peak(),
                    60,
                ))
            }
            Phase::Allocation => {
                self.allocations.fetch_add(1, Ordering::SeqCst);
                assert!(request.prior.is_some(), "allocation needs the exploration");
                if self.fail_allocation {
                    return Err(NsError::sampler("stub_allocation", "allocation crashed"));
                }
                Ok(self.write(
                    request.output_dir,
                    request.file_root,
                    request.seed,
                    request.schedule.peak(),
                    80,
                ))
            }
        }
    }

    fn merge(
        &self,
        exploration: &RunArtifact,
        allocation: &RunArtifact,
        file_root: &str,
        output_dir: &Path,
    ) -> Result<RunArtifact, NsError> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        let ndead = exploration.ndead() + allocation.ndead();
        Ok(self.write(output_dir, file_root, exploration.seed, 1, ndead))
    }
}

/// Plan with `goal ∈ {None, 0.25}` and two repeats starting at ordinal 1.
pub fn goal_plan(base_dir: PathBuf) -> BatchPlan {
    let mut plan = BatchPlan::new("gaussian");
    plan.settings = SamplerSettings {
        nlive: 10,
        base_dir,
        ..SamplerSettings::default()
    };
    plan.axes = vec![
        ExperimentAxis::setting("dynamic_goal", vec![json!(null), json!(0.25)]),
        ExperimentAxis::repeat(1, 2),
    ];
    plan.dynamic.ninit = 5;
    plan
}

/// Plan with a single setting axis and `count` repeats.
pub fn repeat_plan(base_dir: PathBuf, count: u64) -> BatchPlan {
    let mut plan = BatchPlan::new("gaussian");
    plan.settings.base_dir = base_dir;
    plan.settings.nlive = 10;
    plan.axes = vec![ExperimentAxis::repeat(1, count)];
    plan
}
