use std::collections::BTreeSet;

use nsrun_core::errors::{ErrorInfo, NsError};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::job::{AllocationBudget, JobSpec, MethodGroup};
use crate::plan::{stats_required, BatchPlan, ExperimentAxis, GOAL_AXIS};
use crate::seed::{SeedAssigner, SeedPolicy};

/// Expands a batch plan into method groups and jobs.
///
/// Setting axes form the cartesian product in outer-axis-major order; the
/// repeat axis is innermost, so every repeat of a group is contiguous.
#[derive(Debug)]
pub struct ConfigurationMatrix<'a> {
    plan: &'a BatchPlan,
    setting_axes: Vec<(&'a str, &'a [Value])>,
    repeat_start: u64,
    repeat_count: u64,
}

impl<'a> ConfigurationMatrix<'a> {
    /// Validates the plan's axes.
    pub fn new(plan: &'a BatchPlan) -> Result<Self, NsError> {
        plan.validate()?;
        let mut setting_axes = Vec::new();
        let mut names = BTreeSet::new();
        let mut repeat = None;
        for (idx, axis) in plan.axes.iter().enumerate() {
            if repeat.is_some() {
                return Err(NsError::Config(
                    ErrorInfo::new("repeat_axis_not_last", "the repeat axis must be innermost")
                        .with_context("axis_index", idx.to_string()),
                ));
            }
            match axis {
                ExperimentAxis::Setting { name, values } => {
                    if values.is_empty() {
                        return Err(NsError::Config(
                            ErrorInfo::new("empty_axis", "axis has no values to sweep")
                                .with_context("axis", name.clone()),
                        ));
                    }
                    if !names.insert(name.as_str()) {
                        return Err(NsError::Config(
                            ErrorInfo::new("duplicate_axis", "axis is declared twice")
                                .with_context("axis", name.clone()),
                        ));
                    }
                    setting_axes.push((name.as_str(), values.as_slice()));
                }
                ExperimentAxis::Repeat { start, count } => {
                    if *count == 0 {
                        return Err(NsError::config("empty_axis", "repeat axis has no repeats"));
                    }
                    repeat = Some((*start, *count));
                }
            }
        }
        let (repeat_start, repeat_count) = repeat.unwrap_or((1, 1));
        Ok(Self {
            plan,
            setting_axes,
            repeat_start,
            repeat_count,
        })
    }

    /// Number of jobs the matrix expands to.
    pub fn len(&self) -> usize {
        let groups: usize = self
            .setting_axes
            .iter()
            .map(|(_, values)| values.len())
            .product();
        groups * self.repeat_count as usize
    }

    /// Whether the matrix is empty (never true for a validated plan).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordinals of the repeat axis.
    pub fn ordinals(&self) -> impl Iterator<Item = u64> {
        self.repeat_start..self.repeat_start + self.repeat_count
    }

    /// Resolves every method group in matrix order.
    pub fn groups(&self) -> Result<Vec<MethodGroup>, NsError> {
        let mut combos = Vec::new();
        expand_grid(&self.setting_axes, 0, Vec::new(), &mut combos);
        let mut labels = BTreeSet::new();
        let mut groups = Vec::with_capacity(combos.len());
        for (index, overrides) in combos.into_iter().enumerate() {
            let group = self.resolve_group(index, overrides)?;
            if !labels.insert(group.label.clone()) {
                return Err(NsError::Config(
                    ErrorInfo::new("duplicate_method_group", "two axis values share a label")
                        .with_context("method_group", group.label),
                ));
            }
            groups.push(group);
        }
        Ok(groups)
    }

    fn resolve_group(
        &self,
        index: usize,
        overrides: Vec<(String, Value)>,
    ) -> Result<MethodGroup, NsError> {
        let dynamic = &self.plan.dynamic;
        let mut settings = self.plan.settings.clone();
        let mut goal = None;
        for (name, value) in &overrides {
            if name == GOAL_AXIS {
                goal = parse_goal(value)?;
            } else {
                settings = settings.with_override(name, value)?;
            }
        }
        let label = group_label(&overrides, goal);
        if !settings.write_stats {
            return Err(stats_required().with_context("method_group", label));
        }
        if let Some(cap) = dynamic.max_ndead {
            settings.max_ndead = if goal.is_some() {
                i64::try_from(cap).unwrap_or(i64::MAX)
            } else {
                -1
            };
        }
        let budget = AllocationBudget {
            initial_live_points: dynamic.ninit,
            initial_step_size: dynamic.init_step(),
            allocation_goal: goal,
            max_total_samples: goal.and(dynamic.max_ndead),
            nlive_const: dynamic.nlive_const.unwrap_or(settings.nlive),
        };
        let root_prefix = settings_root(&self.plan.name, &overrides, &budget, settings.num_repeats);
        Ok(MethodGroup {
            index,
            label,
            overrides,
            settings,
            budget,
            root_prefix,
        })
    }
}

fn expand_grid(
    axes: &[(&str, &[Value])],
    idx: usize,
    current: Vec<(String, Value)>,
    outputs: &mut Vec<Vec<(String, Value)>>,
) {
    if idx == axes.len() {
        outputs.push(current);
        return;
    }
    let (name, values) = axes[idx];
    for value in values {
        let mut next = current.clone();
        next.push((name.to_string(), value.clone()));
        expand_grid(axes, idx + 1, next, outputs);
    }
}

fn parse_goal(value: &Value) -> Result<Option<f64>, NsError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => match number.as_f64() {
            Some(goal) if (0.0..=1.0).contains(&goal) => Ok(Some(goal)),
            _ => Err(invalid_goal(value)),
        },
        _ => Err(invalid_goal(value)),
    }
}

fn invalid_goal(value: &Value) -> NsError {
    NsError::Config(
        ErrorInfo::new("invalid_goal", "allocation goal must be null or within [0, 1]")
            .with_context("value", value.to_string()),
    )
}

/// Renders an allocation goal the way file roots and labels spell it.
pub fn goal_label(goal: Option<f64>) -> String {
    match goal {
        None => "None".to_string(),
        Some(goal) => format!("{goal}"),
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::String(text) => text.clone(),
        Value::Number(number) => match number.as_i64() {
            Some(int) => int.to_string(),
            None => format!("{}", number.as_f64().unwrap_or_default()),
        },
        other => other.to_string(),
    }
}

fn group_label(overrides: &[(String, Value)], goal: Option<f64>) -> String {
    let mut parts = vec![format!("dg={}", goal_label(goal))];
    parts.extend(
        overrides
            .iter()
            .filter(|(name, _)| name != GOAL_AXIS)
            .map(|(name, value)| format!("{name}={}", value_label(value))),
    );
    parts.join(" ")
}

/// Builds the settings-derived file-root prefix of a method group.
pub fn settings_root(
    name: &str,
    overrides: &[(String, Value)],
    budget: &AllocationBudget,
    num_repeats: u64,
) -> String {
    let mut root = format!("{name}_dg{}", goal_label(budget.allocation_goal));
    if budget.is_dynamic() {
        root.push_str(&format!(
            "_{}init_{}is",
            budget.initial_live_points, budget.initial_step_size
        ));
    }
    for (axis, value) in overrides.iter().filter(|(axis, _)| axis != GOAL_AXIS) {
        root.push_str(&format!("_{axis}{}", value_label(value)));
    }
    root.push_str(&format!("_{}nlive_{}nrepeats", budget.nlive_const, num_repeats));
    root.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Builds the seed assigner configured by the plan for this context.
pub fn seed_assigner(plan: &BatchPlan, ctx: &ExecutionContext) -> Result<SeedAssigner, NsError> {
    let policy = plan
        .seed
        .policy
        .unwrap_or_else(|| SeedPolicy::for_context(ctx));
    policy.validate(ctx)?;
    let increment = if ctx.is_multi_process() {
        -1
    } else {
        plan.dynamic.seed_increment
    };
    Ok(SeedAssigner::new(policy, plan.seed.multiplier).with_increment(increment))
}

/// Expands and stamps every job of the plan.
pub fn build_jobs(plan: &BatchPlan, ctx: &ExecutionContext) -> Result<Vec<JobSpec>, NsError> {
    let assigner = seed_assigner(plan, ctx)?;
    build_jobs_with(plan, &assigner)
}

/// Expands and stamps every job of the plan with an explicit assigner.
pub fn build_jobs_with(plan: &BatchPlan, assigner: &SeedAssigner) -> Result<Vec<JobSpec>, NsError> {
    let matrix = ConfigurationMatrix::new(plan)?;
    let groups = matrix.groups()?;
    let mut jobs = Vec::with_capacity(matrix.len());
    let mut roots = BTreeSet::new();
    for group in &groups {
        for ordinal in matrix.ordinals() {
            let seed = assigner.assign(ordinal)?;
            let file_root = format!("{}_{}", group.root_prefix, seed.suffix);
            if !roots.insert(file_root.clone()) {
                return Err(NsError::Config(
                    ErrorInfo::new("duplicate_file_root", "two jobs share an output identifier")
                        .with_context("file_root", file_root),
                ));
            }
            jobs.push(JobSpec {
                position: jobs.len(),
                group_index: group.index,
                method_group: group.label.clone(),
                ordinal,
                overrides: group.overrides.clone(),
                settings: group.settings.clone(),
                budget: group.budget.clone(),
                seed,
                file_root,
                output_dir: group.settings.base_dir.clone(),
            });
        }
    }
    Ok(jobs)
}
