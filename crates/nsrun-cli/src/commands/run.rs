use std::path::PathBuf;

use clap::{Args, ValueEnum};
use nsrun_core::errors::NsError;
use nsrun_sampler::{reference_sampler, LikelihoodKind, PriorKind};
use nsrun_sched::{load_plan, run_batch, ExecutionContext, TracingProgress};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LikelihoodArg {
    Gaussian,
    ExpPower,
    GaussianMix,
}

impl From<LikelihoodArg> for LikelihoodKind {
    fn from(arg: LikelihoodArg) -> Self {
        match arg {
            LikelihoodArg::Gaussian => LikelihoodKind::Gaussian,
            LikelihoodArg::ExpPower => LikelihoodKind::ExpPower,
            LikelihoodArg::GaussianMix => LikelihoodKind::GaussianMix,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PriorArg {
    Uniform,
    Gaussian,
}

impl From<PriorArg> for PriorKind {
    fn from(arg: PriorArg) -> Self {
        match arg {
            PriorArg::Uniform => PriorKind::Uniform,
            PriorArg::Gaussian => PriorKind::Gaussian,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the plan YAML file.
    #[arg(long)]
    pub plan: PathBuf,
    /// Override the plan's worker count.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Re-run jobs whose artefacts already exist.
    #[arg(long, default_value_t = false)]
    pub clean: bool,
    /// Override the plan's base output directory.
    #[arg(long)]
    pub base_dir: Option<PathBuf>,
    /// Likelihood evaluated by the reference sampler.
    #[arg(long, value_enum, default_value = "gaussian-mix")]
    pub likelihood: LikelihoodArg,
    /// Prior of the reference sampler.
    #[arg(long, value_enum, default_value = "gaussian")]
    pub prior: PriorArg,
    /// Parameter space dimensionality (or the plan's `ndim` setting).
    #[arg(long)]
    pub ndim: Option<usize>,
    /// Prior width.
    #[arg(long, default_value_t = 10.0)]
    pub prior_scale: f64,
}

pub fn run(args: &RunArgs) -> Result<(), NsError> {
    let mut plan = load_plan(&args.plan)?;
    if let Some(workers) = args.workers {
        plan.workers = workers;
    }
    plan.clean |= args.clean;
    if let Some(base_dir) = &args.base_dir {
        plan.settings.base_dir = base_dir.clone();
    }
    plan.validate()?;

    let ndim = args
        .ndim
        .or_else(|| plan.settings.extra_f64("ndim").map(|n| n as usize))
        .unwrap_or(2);
    let sampler = reference_sampler(
        args.likelihood.into(),
        args.prior.into(),
        ndim,
        args.prior_scale,
    );
    let ctx = ExecutionContext::single_process();
    let report = run_batch(&plan, &ctx, sampler.as_ref(), &TracingProgress)?;
    print!("{}", report.render_summary());
    Ok(())
}
