use nsrun_sched::{
    build_jobs, load_plan, store_plan, BatchPlan, ExecutionContext, ExperimentAxis, SeedPolicy,
};
use serde_json::json;

#[test]
fn plan_survives_yaml_roundtrip() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let mut plan = BatchPlan::new("gaussian_mix");
    plan.axes = vec![
        ExperimentAxis::setting("dynamic_goal", vec![json!(null), json!(0), json!(0.25), json!(1)]),
        ExperimentAxis::setting("ndim", vec![json!(2), json!(10)]),
        ExperimentAxis::repeat(1, 5),
    ];
    plan.seed.policy = Some(SeedPolicy::DeterministicPerJob);
    plan.dynamic.max_ndead = Some(5000);
    plan.workers = 4;
    let path = temp.path().join("plans").join("mix.yaml");
    store_plan(&plan, &path).expect("store");
    let loaded = load_plan(&path).expect("load");
    assert_eq!(loaded, plan);
    assert_eq!(loaded.plan_hash().expect("hash"), plan.plan_hash().expect("hash"));
}

#[test]
fn minimal_yaml_uses_defaults() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let path = temp.path().join("minimal.yaml");
    std::fs::write(
        &path,
        "name: gaussian\naxes:\n  - kind: setting\n    name: dynamic_goal\n    values: [null, 0.25]\n  - kind: repeat\n    start: 1\n    count: 2\n",
    )
    .expect("write");
    let plan = load_plan(&path).expect("load");
    assert_eq!(plan.settings.nlive, 100);
    assert!(plan.settings.do_clustering);
    assert_eq!(plan.settings.max_ndead, -1);
    assert_eq!(plan.seed.multiplier, 1000);
    assert_eq!(plan.seed.policy, None);
    assert_eq!(plan.dynamic.ninit, 20);
    assert_eq!(plan.dynamic.init_step(), 20);
    assert_eq!(plan.workers, 1);
    assert!(!plan.clean);
}

#[test]
fn hash_changes_with_contents() {
    let plan = BatchPlan::new("a");
    let mut other = plan.clone();
    other.settings.nlive = 101;
    assert_ne!(plan.plan_hash().expect("hash"), other.plan_hash().expect("hash"));
}

#[test]
fn hash_ignores_yaml_key_order() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let first = temp.path().join("first.yaml");
    let second = temp.path().join("second.yaml");
    std::fs::write(&first, "name: gaussian\nworkers: 2\nclean: true\n").expect("write");
    std::fs::write(&second, "clean: true\nworkers: 2\nname: gaussian\n").expect("write");
    let first = load_plan(&first).expect("first plan");
    let second = load_plan(&second).expect("second plan");
    assert_eq!(first.plan_hash().expect("hash"), second.plan_hash().expect("hash"));
}

#[test]
fn invalid_plan_is_rejected_on_load() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let path = temp.path().join("bad.yaml");
    std::fs::write(&path, "name: gaussian\nworkers: 0\n").expect("write");
    let err = load_plan(&path).expect_err("zero workers");
    assert_eq!(err.info().code, "zero_workers");
}

#[test]
fn checked_in_smoke_plan_expands() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../batches/smoke.yaml");
    let plan = load_plan(&path).expect("smoke plan");
    assert_eq!(plan.settings.extra_f64("ndim"), Some(2.0));
    let jobs = build_jobs(&plan, &ExecutionContext::single_process()).expect("expand");
    assert_eq!(jobs.len(), 12);
    assert_eq!(jobs.iter().filter(|job| job.budget.allocation_goal.is_some()).count(), 9);
}

#[test]
fn disabling_the_stats_file_is_rejected() {
    let mut plan = BatchPlan::new("gaussian");
    plan.settings.write_stats = false;
    let err = plan.validate().expect_err("stats required");
    assert_eq!(err.info().code, "stats_required");
    assert_eq!(err.exit_status(), 1);
}
