use std::path::Path;
use std::process::{Command, Output};

fn nsrun(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_nsrun"))
        .args(args)
        .env("NSRUN_LOG", "warn")
        .output()
        .expect("failed to spawn nsrun")
}

fn write_small_plan(dir: &Path) -> String {
    let plan = dir.join("plan.yaml");
    let chains = dir.join("chains");
    let output = nsrun(&[
        "plan",
        "--out",
        plan.to_str().expect("utf8 path"),
        "--name",
        "gaussian",
        "--nlive",
        "15",
        "--repeats",
        "2",
        "--goals",
        "none,0.25",
        "--ninit",
        "5",
        "--precision-criterion",
        "0.01",
        "--base-dir",
        chains.to_str().expect("utf8 path"),
        "--workers",
        "2",
    ]);
    assert!(
        output.status.success(),
        "plan failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    plan.to_str().expect("utf8 path").to_string()
}

#[test]
fn plan_run_and_summarize_round_trip() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let plan = write_small_plan(temp.path());
    let plan_text = std::fs::read_to_string(&plan).expect("plan yaml");
    assert!(plan_text.contains("dynamic_goal"));

    let run = nsrun(&[
        "run",
        "--plan",
        &plan,
        "--likelihood",
        "gaussian",
        "--prior",
        "uniform",
        "--ndim",
        "2",
        "--prior-scale",
        "5",
    ]);
    assert!(
        run.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&run.stderr)
    );
    let stdout = String::from_utf8_lossy(&run.stdout);
    assert!(stdout.contains("total: 4 success, 0 skipped, 0 failed"), "{stdout}");

    let report = temp.path().join("chains").join("batch_report.json");
    assert!(report.exists());
    let summary_path = temp.path().join("summary.txt");
    let summarize = nsrun(&[
        "summarize",
        "--report",
        report.to_str().expect("utf8 path"),
        "--out",
        summary_path.to_str().expect("utf8 path"),
    ]);
    assert!(summarize.status.success());
    assert_eq!(
        String::from_utf8_lossy(&summarize.stdout),
        stdout,
        "summary should match the run output"
    );
    let written = std::fs::read_to_string(&summary_path).expect("summary file");
    assert_eq!(written, stdout);
}

#[test]
fn rerun_skips_completed_jobs_unless_clean() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let plan = write_small_plan(temp.path());
    let args = [
        "run",
        "--plan",
        plan.as_str(),
        "--likelihood",
        "gaussian",
        "--prior",
        "uniform",
        "--prior-scale",
        "5",
    ];
    assert!(nsrun(&args).status.success());

    let rerun = nsrun(&args);
    assert!(rerun.status.success());
    assert!(String::from_utf8_lossy(&rerun.stdout)
        .contains("total: 0 success, 4 skipped, 0 failed"));

    let mut clean_args = args.to_vec();
    clean_args.push("--clean");
    let clean = nsrun(&clean_args);
    assert!(clean.status.success());
    assert!(String::from_utf8_lossy(&clean.stdout)
        .contains("total: 4 success, 0 skipped, 0 failed"));
}

#[test]
fn missing_plan_fails_with_status_one() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let missing = temp.path().join("absent.yaml");
    let output = nsrun(&["run", "--plan", missing.to_str().expect("utf8 path")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("plan_read"));
}

#[test]
fn invalid_goal_is_rejected() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let plan = temp.path().join("plan.yaml");
    let output = nsrun(&[
        "plan",
        "--out",
        plan.to_str().expect("utf8 path"),
        "--goals",
        "none,sideways",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!plan.exists());
}

#[test]
fn plan_without_stats_file_is_rejected() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let plan = temp.path().join("no_stats.yaml");
    std::fs::write(&plan, "name: gaussian\nsettings:\n  write_stats: false\n").expect("plan");
    let output = nsrun(&["run", "--plan", plan.to_str().expect("utf8 path")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("stats_required"));
}
