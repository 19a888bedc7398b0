use std::collections::BTreeMap;
use std::path::PathBuf;

use nsrun_core::errors::{ErrorInfo, NsError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sampler hyperparameters shared by every job of a batch.
///
/// The template is never mutated once a batch is planned; each job receives
/// its own copy with axis overrides applied through [`SamplerSettings::with_override`].
/// Keys the scheduler does not know about (problem dimensionality, prior
/// scale, ...) are kept verbatim in `extra` and forwarded to the sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Number of live points for constant-nlive runs.
    pub nlive: u64,
    /// Number of repeats per sampling step.
    pub num_repeats: u64,
    /// Enables clustering (and the `clusters/` output subdirectory).
    pub do_clustering: bool,
    /// Stopping criterion on the remaining evidence fraction.
    pub precision_criterion: f64,
    /// Maximum number of dead points; `-1` means unbounded.
    pub max_ndead: i64,
    /// Sampler verbosity.
    pub feedback: i32,
    /// Directory receiving every job's output files.
    pub base_dir: PathBuf,
    /// Posterior boosting factor.
    pub boost_posterior: f64,
    /// Write weighted posterior samples.
    pub posteriors: bool,
    /// Write equally weighted posterior samples.
    pub equals: bool,
    /// Write per-cluster posterior files.
    pub cluster_posteriors: bool,
    /// Write the dead points file.
    pub write_dead: bool,
    /// Write the stats summary file.
    pub write_stats: bool,
    /// Write the parameter names file.
    pub write_paramnames: bool,
    /// Write prior samples.
    pub write_prior: bool,
    /// Write the final live points.
    pub write_live: bool,
    /// Write resume files.
    pub write_resume: bool,
    /// Resume from an existing resume file.
    pub read_resume: bool,
    /// Problem-specific keys forwarded to the sampler untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            nlive: 100,
            num_repeats: 10,
            do_clustering: true,
            precision_criterion: 0.001,
            max_ndead: -1,
            feedback: -1,
            base_dir: PathBuf::from("chains"),
            boost_posterior: 0.0,
            posteriors: false,
            equals: false,
            cluster_posteriors: false,
            write_dead: true,
            write_stats: true,
            write_paramnames: false,
            write_prior: false,
            write_live: false,
            write_resume: false,
            read_resume: false,
            extra: BTreeMap::new(),
        }
    }
}

impl SamplerSettings {
    /// Returns a copy of the settings with `key` replaced by `value`.
    ///
    /// Known keys are type checked; unknown keys land in `extra`.
    pub fn with_override(&self, key: &str, value: &Value) -> Result<Self, NsError> {
        let mut doc = serde_json::to_value(self).map_err(|err| {
            NsError::Serde(ErrorInfo::new("settings_serialize", err.to_string()))
        })?;
        match doc.as_object_mut() {
            Some(map) => {
                map.insert(key.to_string(), value.clone());
            }
            None => {
                return Err(NsError::config(
                    "settings_shape",
                    "settings did not serialize to a mapping",
                ))
            }
        }
        serde_json::from_value(doc).map_err(|err| {
            NsError::Config(
                ErrorInfo::new("invalid_override", err.to_string())
                    .with_context("key", key)
                    .with_context("value", value.to_string()),
            )
        })
    }

    /// Looks up a forwarded problem key.
    pub fn extra_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }

    /// Path of the cluster output directory when clustering is enabled.
    pub fn clusters_dir(&self) -> Option<PathBuf> {
        self.do_clustering.then(|| self.base_dir.join("clusters"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn override_replaces_known_keys() {
        let base = SamplerSettings::default();
        let updated = base.with_override("nlive", &json!(250)).expect("override");
        assert_eq!(updated.nlive, 250);
        assert_eq!(base.nlive, 100);
    }

    #[test]
    fn unknown_keys_are_forwarded() {
        let updated = SamplerSettings::default()
            .with_override("ndim", &json!(10))
            .expect("override");
        assert_eq!(updated.extra_f64("ndim"), Some(10.0));
    }

    #[test]
    fn mistyped_override_is_a_configuration_error() {
        let err = SamplerSettings::default()
            .with_override("nlive", &json!("many"))
            .expect_err("type mismatch");
        assert_eq!(err.info().code, "invalid_override");
    }
}
