use std::path::PathBuf;

use clap::Args;
use nsrun_core::errors::NsError;
use nsrun_sched::{store_plan, BatchPlan, ExperimentAxis, SeedPolicy, GOAL_AXIS};
use serde_json::Value;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Destination path for the generated plan YAML.
    #[arg(long)]
    pub out: PathBuf,
    /// Batch name used as the file root prefix.
    #[arg(long, default_value = "gaussian")]
    pub name: String,
    /// Live points of the constant-nlive runs.
    #[arg(long, default_value_t = 100)]
    pub nlive: u64,
    /// Stopping criterion on the remaining evidence fraction.
    #[arg(long, default_value_t = 0.001)]
    pub precision_criterion: f64,
    /// Repeats per sampling step.
    #[arg(long, default_value_t = 10)]
    pub num_repeats: u64,
    /// Number of repeats of every method group.
    #[arg(long, default_value_t = 10)]
    pub repeats: u64,
    /// First repeat ordinal.
    #[arg(long, default_value_t = 1)]
    pub start: u64,
    /// Allocation goals to sweep; `none` disables the dynamic phase.
    #[arg(long, value_delimiter = ',', default_value = "none,0,0.25,1")]
    pub goals: Vec<String>,
    /// Live points of the exploration phase.
    #[arg(long, default_value_t = 20)]
    pub ninit: u64,
    /// Total sample cap of dynamic jobs.
    #[arg(long)]
    pub max_ndead: Option<u64>,
    /// Base output directory.
    #[arg(long, default_value = "chains")]
    pub base_dir: PathBuf,
    /// Worker slots.
    #[arg(long, default_value_t = 1)]
    pub workers: usize,
    /// Mark every job unseeded.
    #[arg(long, default_value_t = false)]
    pub unseeded: bool,
}

fn parse_goal(raw: &str) -> Result<Value, NsError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return Ok(Value::Null);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| NsError::config("invalid_goal", format!("cannot parse goal '{raw}'")))
}

pub fn build_plan(args: &PlanArgs) -> Result<BatchPlan, NsError> {
    let goals = args
        .goals
        .iter()
        .map(|goal| parse_goal(goal))
        .collect::<Result<Vec<_>, _>>()?;
    let mut plan = BatchPlan::new(args.name.clone());
    plan.settings.nlive = args.nlive;
    plan.settings.num_repeats = args.num_repeats;
    plan.settings.precision_criterion = args.precision_criterion;
    plan.settings.base_dir = args.base_dir.clone();
    plan.axes = vec![
        ExperimentAxis::setting(GOAL_AXIS, goals),
        ExperimentAxis::repeat(args.start, args.repeats),
    ];
    plan.dynamic.ninit = args.ninit;
    plan.dynamic.max_ndead = args.max_ndead;
    plan.workers = args.workers;
    if args.unseeded {
        plan.seed.policy = Some(SeedPolicy::NonDeterministic);
    }
    plan.validate()?;
    Ok(plan)
}

pub fn run(args: &PlanArgs) -> Result<(), NsError> {
    let plan = build_plan(args)?;
    store_plan(&plan, &args.out)?;
    tracing::info!(path = %args.out.display(), hash = %plan.plan_hash()?, "plan written");
    Ok(())
}
