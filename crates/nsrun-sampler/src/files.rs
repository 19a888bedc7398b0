use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use nsrun_core::errors::{ErrorInfo, NsError};
use nsrun_sched::serde::{from_json_slice, to_canonical_json_bytes};
use nsrun_sched::{create_dir_tolerant, RunArtifact, SamplerSettings};
use serde::{Deserialize, Serialize};

fn io_error(code: &str, path: &Path, err: impl ToString) -> NsError {
    NsError::Sampler(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// One dead point: likelihood, live points when it died, and its position.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadPoint {
    /// Log-likelihood.
    pub logl: f64,
    /// Live points at the time the point died.
    pub nlive: u64,
    /// Physical-space parameters; empty when positions were not recorded.
    pub theta: Vec<f64>,
}

/// Contents of the `<file_root>.stats` completion marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Identifier of the run.
    pub file_root: String,
    /// Seed the run used.
    pub seed: i64,
    /// Dead points written.
    pub ndead: usize,
    /// Log-evidence estimate; absent for an empty run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_evidence: Option<f64>,
    /// Largest live-point count of the run.
    pub nlive_peak: u64,
    /// Likelihood identifier.
    pub likelihood: String,
    /// Prior identifier.
    pub prior: String,
    /// Dimensionality.
    pub ndim: usize,
}

impl RunStats {
    /// Reads a stats file.
    pub fn load(path: &Path) -> Result<Self, NsError> {
        let bytes = fs::read(path).map_err(|err| io_error("stats_read", path, err))?;
        from_json_slice(&bytes)
    }
}

/// Which optional files a run writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFlags {
    /// `<root>_dead.txt`.
    pub dead: bool,
    /// `<root>.stats`.
    pub stats: bool,
    /// `<root>.txt` weighted posterior samples.
    pub posteriors: bool,
    /// `<root>.paramnames`.
    pub paramnames: bool,
    /// `clusters/<root>_1.txt`.
    pub cluster_posteriors: bool,
}

impl OutputFlags {
    /// Flags requested by a settings map.
    pub fn from_settings(settings: &SamplerSettings) -> Self {
        Self {
            dead: settings.write_dead,
            stats: settings.write_stats,
            posteriors: settings.posteriors,
            paramnames: settings.write_paramnames,
            cluster_posteriors: settings.do_clustering && settings.cluster_posteriors,
        }
    }

    /// Flags an existing artefact was written with.
    pub fn detect(artifact: &RunArtifact) -> Self {
        let root = &artifact.file_root;
        let has = |name: String| artifact.files.iter().any(|file| file.ends_with(&name));
        Self {
            dead: has(format!("{root}_dead.txt")),
            stats: has(format!("{root}.stats")),
            posteriors: has(format!("{root}.txt")),
            paramnames: has(format!("{root}.paramnames")),
            cluster_posteriors: has(format!("{root}_1.txt")),
        }
    }
}

/// Path of the dead points file of a run.
pub fn dead_path(output_dir: &Path, file_root: &str) -> PathBuf {
    output_dir.join(format!("{file_root}_dead.txt"))
}

/// Log-evidence and posterior log-weights of a dead point sequence.
pub fn log_weights(points: &[DeadPoint]) -> (f64, Vec<f64>) {
    let mut log_x = 0.0_f64;
    let mut logw = Vec::with_capacity(points.len());
    for point in points {
        let n = point.nlive.max(1) as f64;
        let shrink = (n / (n + 1.0)).ln();
        logw.push(point.logl + log_x + (-shrink.exp()).ln_1p());
        log_x += shrink;
    }
    let max = logw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let log_z = if max.is_finite() {
        max + logw.iter().map(|w| (w - max).exp()).sum::<f64>().ln()
    } else {
        f64::NEG_INFINITY
    };
    (log_z, logw)
}

/// Metadata recorded in the stats file.
#[derive(Debug, Clone)]
pub struct RunMeta<'a> {
    /// Seed the run used.
    pub seed: i64,
    /// Likelihood identifier.
    pub likelihood: &'a str,
    /// Prior identifier.
    pub prior: &'a str,
    /// Dimensionality.
    pub ndim: usize,
}

/// Writes the run's files and returns its artefact.
pub fn write_run(
    output_dir: &Path,
    file_root: &str,
    points: &[DeadPoint],
    flags: OutputFlags,
    meta: &RunMeta<'_>,
) -> Result<RunArtifact, NsError> {
    create_dir_tolerant(output_dir)?;
    let (log_z, logw) = log_weights(points);
    let mut artifact = RunArtifact::new(output_dir, file_root, meta.seed);
    artifact.logl = points.iter().map(|p| p.logl).collect();
    artifact.nlive = points.iter().map(|p| p.nlive).collect();
    artifact.log_evidence = log_z.is_finite().then_some(log_z);

    if flags.dead {
        let mut body = String::new();
        for point in points {
            let _ = write!(body, "{} {}", point.logl, point.nlive);
            for x in &point.theta {
                let _ = write!(body, " {x}");
            }
            body.push('\n');
        }
        let path = dead_path(output_dir, file_root);
        fs::write(&path, body).map_err(|err| io_error("dead_write", &path, err))?;
        artifact.files.push(path);
    }

    let posterior = || {
        let mut body = String::new();
        for (point, w) in points.iter().zip(&logw) {
            let _ = write!(body, "{} {}", (w - log_z).exp(), -2.0 * point.logl);
            for x in &point.theta {
                let _ = write!(body, " {x}");
            }
            body.push('\n');
        }
        body
    };
    if flags.posteriors {
        let path = output_dir.join(format!("{file_root}.txt"));
        fs::write(&path, posterior()).map_err(|err| io_error("posterior_write", &path, err))?;
        artifact.files.push(path);
    }
    if flags.cluster_posteriors {
        let clusters = output_dir.join("clusters");
        create_dir_tolerant(&clusters)?;
        let path = clusters.join(format!("{file_root}_1.txt"));
        fs::write(&path, posterior()).map_err(|err| io_error("cluster_write", &path, err))?;
        artifact.files.push(path);
    }
    if flags.paramnames {
        let mut body = String::new();
        for i in 1..=meta.ndim {
            let _ = writeln!(body, "p{i} \\theta_{{{i}}}");
        }
        let path = output_dir.join(format!("{file_root}.paramnames"));
        fs::write(&path, body).map_err(|err| io_error("paramnames_write", &path, err))?;
        artifact.files.push(path);
    }
    if flags.stats {
        let stats = RunStats {
            file_root: file_root.to_string(),
            seed: meta.seed,
            ndead: points.len(),
            log_evidence: artifact.log_evidence,
            nlive_peak: points.iter().map(|p| p.nlive).max().unwrap_or(0),
            likelihood: meta.likelihood.to_string(),
            prior: meta.prior.to_string(),
            ndim: meta.ndim,
        };
        let path = RunArtifact::completion_marker(output_dir, file_root);
        fs::write(&path, to_canonical_json_bytes(&stats)?)
            .map_err(|err| io_error("stats_write", &path, err))?;
        artifact.files.push(path);
    }
    Ok(artifact)
}

/// Dead points of an artefact, with positions when its dead file exists.
pub fn load_points(artifact: &RunArtifact) -> Result<Vec<DeadPoint>, NsError> {
    let path = dead_path(&artifact.output_dir, &artifact.file_root);
    if !path.is_file() {
        return Ok(artifact
            .logl
            .iter()
            .zip(&artifact.nlive)
            .map(|(&logl, &nlive)| DeadPoint {
                logl,
                nlive,
                theta: Vec::new(),
            })
            .collect());
    }
    let text = fs::read_to_string(&path).map_err(|err| io_error("dead_read", &path, err))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut fields = line.split_whitespace();
            let malformed = || io_error("dead_parse", &path, format!("malformed line: {line}"));
            let logl = fields
                .next()
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(malformed)?;
            let nlive = fields
                .next()
                .and_then(|v| v.parse::<u64>().ok())
                .ok_or_else(malformed)?;
            let theta = fields
                .map(|v| v.parse::<f64>().map_err(|_| malformed()))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DeadPoint { logl, nlive, theta })
        })
        .collect()
}
