mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use nsrun_core::errors::NsError;
use nsrun_sched::{
    build_jobs, ChannelProgress, DispatchOpts, Dispatcher, ExecutionContext, JobOutcome,
    JobRunner, JobSpec, NoProgress, RunArtifact, SinglePhaseRunner,
};

struct FlakyRunner {
    fail_positions: BTreeSet<usize>,
    panic_positions: BTreeSet<usize>,
    calls: AtomicUsize,
}

impl FlakyRunner {
    fn new(fail: &[usize]) -> Self {
        Self {
            fail_positions: fail.iter().copied().collect(),
            panic_positions: BTreeSet::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl JobRunner for FlakyRunner {
    fn run_job(&self, job: &JobSpec) -> Result<RunArtifact, NsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_positions.contains(&job.position) {
            panic!("runner crashed");
        }
        if self.fail_positions.contains(&job.position) {
            return Err(NsError::sampler("stub_failure", "forced"));
        }
        let mut artifact = RunArtifact::new(&job.output_dir, &job.file_root, job.seed.seed);
        artifact.logl = vec![-1.0; job.position + 1];
        artifact.nlive = vec![10; job.position + 1];
        Ok(artifact)
    }
}

fn ten_jobs(dir: &std::path::Path) -> Vec<JobSpec> {
    let plan = common::repeat_plan(dir.to_path_buf(), 10);
    build_jobs(&plan, &ExecutionContext::single_process()).expect("jobs")
}

#[test]
fn failures_do_not_cancel_siblings() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let jobs = ten_jobs(temp.path());
    let runner = FlakyRunner::new(&[2, 5]);
    let ctx = ExecutionContext::single_process();
    let opts = DispatchOpts {
        workers: 3,
        clean: false,
    };
    let records = Dispatcher::new(&ctx, opts, &NoProgress)
        .dispatch(&jobs, &runner)
        .expect("dispatch");

    assert_eq!(records.len(), 10);
    let success = records.iter().filter(|r| r.outcome.is_success()).count();
    let failed: Vec<_> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.outcome.is_failed())
        .map(|(index, _)| index)
        .collect();
    assert_eq!(success, 8);
    assert_eq!(failed, vec![2, 5]);
    let roots: BTreeSet<_> = records.iter().map(|r| r.file_root.as_str()).collect();
    assert_eq!(roots.len(), 10);
    for (record, job) in records.iter().zip(&jobs) {
        assert_eq!(record.file_root, job.file_root);
    }
    assert_eq!(runner.calls.load(Ordering::SeqCst), 10);
}

#[test]
fn panicking_runner_is_recorded_as_failure() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let jobs = ten_jobs(temp.path());
    let mut runner = FlakyRunner::new(&[]);
    runner.panic_positions.insert(4);
    let ctx = ExecutionContext::single_process();
    let records = Dispatcher::new(&ctx, DispatchOpts::default(), &NoProgress)
        .dispatch(&jobs, &runner)
        .expect("dispatch");
    match &records[4].outcome {
        JobOutcome::Failed { reason } => assert!(reason.contains("runner crashed")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(records.iter().filter(|r| r.outcome.is_success()).count(), 9);
}

#[test]
fn existing_artefacts_are_skipped_unless_clean() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let jobs = ten_jobs(temp.path());
    std::fs::write(
        RunArtifact::completion_marker(&jobs[1].output_dir, &jobs[1].file_root),
        b"{}",
    )
    .expect("marker");
    let ctx = ExecutionContext::single_process();

    let runner = FlakyRunner::new(&[]);
    let records = Dispatcher::new(&ctx, DispatchOpts::default(), &NoProgress)
        .dispatch(&jobs, &runner)
        .expect("dispatch");
    assert_eq!(records[1].outcome, JobOutcome::Skipped);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 9);

    let runner = FlakyRunner::new(&[]);
    let opts = DispatchOpts {
        workers: 1,
        clean: true,
    };
    let records = Dispatcher::new(&ctx, opts, &NoProgress)
        .dispatch(&jobs, &runner)
        .expect("dispatch");
    assert!(records[1].outcome.is_success());
    assert_eq!(runner.calls.load(Ordering::SeqCst), 10);
}

#[test]
fn progress_is_monotonic_per_group() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let plan = common::goal_plan(temp.path().to_path_buf());
    let mut plan = plan;
    plan.axes[1] = nsrun_sched::ExperimentAxis::repeat(1, 6);
    let jobs = build_jobs(&plan, &ExecutionContext::single_process()).expect("jobs");
    let (sender, receiver) = mpsc::channel();
    let sink = ChannelProgress::new(sender);
    let ctx = ExecutionContext::single_process();
    let opts = DispatchOpts {
        workers: 4,
        clean: false,
    };
    let runner = FlakyRunner::new(&[3, 7]);
    Dispatcher::new(&ctx, opts, &sink)
        .dispatch(&jobs, &runner)
        .expect("dispatch");
    drop(sink);

    let mut last: BTreeMap<String, usize> = BTreeMap::new();
    let mut events = 0;
    for event in receiver.iter() {
        events += 1;
        assert_eq!(event.total, 6);
        let previous = last.insert(event.method_group.clone(), event.completed);
        assert_eq!(event.completed, previous.unwrap_or(0) + 1);
    }
    assert_eq!(events, 12);
    assert!(last.values().all(|completed| *completed == 6));
}

#[test]
fn raised_abort_stops_dispatch() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let jobs = ten_jobs(temp.path());
    let ctx = ExecutionContext::single_process();
    ctx.abort(3);
    for workers in [1, 3] {
        let runner = FlakyRunner::new(&[]);
        let opts = DispatchOpts {
            workers,
            clean: false,
        };
        let err = Dispatcher::new(&ctx, opts, &NoProgress)
            .dispatch(&jobs, &runner)
            .expect_err("aborted");
        assert!(matches!(err, NsError::Aborted(_)));
        assert_eq!(err.exit_status(), 3);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn cooperating_ranks_disable_the_pool() {
    let ctx = ExecutionContext::local_group(2).remove(1);
    let opts = DispatchOpts {
        workers: 8,
        clean: false,
    };
    assert_eq!(Dispatcher::new(&ctx, opts, &NoProgress).effective_workers(), 1);
}

#[test]
fn single_phase_runner_delegates_to_sampler() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let jobs = ten_jobs(temp.path());
    let sampler = common::StubSampler::failing_on([jobs[3].file_root.clone()]);
    let runner = SinglePhaseRunner::new(&sampler);
    let ctx = ExecutionContext::single_process();
    let opts = DispatchOpts {
        workers: 2,
        clean: false,
    };
    let records = Dispatcher::new(&ctx, opts, &NoProgress)
        .dispatch(&jobs, &runner)
        .expect("dispatch");
    assert_eq!(sampler.runs.load(Ordering::SeqCst), 10);
    assert!(records[3].outcome.is_failed());
    assert_eq!(records.iter().filter(|r| r.outcome.is_success()).count(), 9);
    for (record, job) in records.iter().zip(&jobs).filter(|(r, _)| r.outcome.is_success()) {
        assert!(RunArtifact::is_complete(&job.output_dir, &record.file_root));
    }
}

#[test]
fn cooperating_ranks_run_disjoint_shares() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let jobs = ten_jobs(temp.path());
    let mut seen = BTreeSet::new();
    for ctx in ExecutionContext::local_group(2) {
        let runner = FlakyRunner::new(&[]);
        let records = Dispatcher::new(&ctx, DispatchOpts::default(), &NoProgress)
            .dispatch(&jobs, &runner)
            .expect("dispatch");
        assert_eq!(records.len(), 5);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 5);
        for record in &records {
            assert!(seen.insert(record.file_root.clone()));
        }
    }
    assert_eq!(seen.len(), 10);
}
