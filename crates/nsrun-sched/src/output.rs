use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use nsrun_core::errors::{ErrorInfo, NsError};

use crate::job::JobSpec;

/// Directories prepared before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArea {
    /// Every directory that exists once preparation finished.
    pub directories: Vec<PathBuf>,
}

/// Creates the shared output tree exactly once.
///
/// Concurrent callers sharing one initializer observe the same outcome; only
/// the first performs filesystem work. Independent initializers racing on the
/// same tree also succeed because "already exists" is treated as success.
#[derive(Debug)]
pub struct OutputAreaInitializer {
    directories: Vec<PathBuf>,
    outcome: OnceLock<Result<OutputArea, NsError>>,
    creations: AtomicUsize,
}

impl OutputAreaInitializer {
    /// Prepares `base_dir`, plus `base_dir/clusters` when clustering is on.
    pub fn new(base_dir: impl Into<PathBuf>, clustering: bool) -> Self {
        let base_dir = base_dir.into();
        let mut directories = vec![base_dir.clone()];
        if clustering {
            directories.push(base_dir.join("clusters"));
        }
        Self::with_directories(directories)
    }

    /// Initializer covering every output directory used by `jobs`.
    pub fn for_jobs(jobs: &[JobSpec]) -> Self {
        let mut directories = BTreeSet::new();
        for job in jobs {
            directories.insert(job.output_dir.clone());
            if let Some(clusters) = job.settings.clusters_dir() {
                directories.insert(clusters);
            }
        }
        Self::with_directories(directories.into_iter().collect())
    }

    fn with_directories(directories: Vec<PathBuf>) -> Self {
        Self {
            directories,
            outcome: OnceLock::new(),
            creations: AtomicUsize::new(0),
        }
    }

    /// Directory layout without touching the filesystem.
    pub fn layout(&self) -> OutputArea {
        OutputArea {
            directories: self.directories.clone(),
        }
    }

    /// Ensures every directory exists; idempotent.
    pub fn ensure(&self) -> Result<OutputArea, NsError> {
        self.outcome.get_or_init(|| self.create()).clone()
    }

    /// Number of times directory creation actually ran.
    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    fn create(&self) -> Result<OutputArea, NsError> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        for dir in &self.directories {
            let created = create_dir_tolerant(dir)?;
            tracing::debug!(path = %dir.display(), created, "output directory ready");
        }
        Ok(self.layout())
    }
}

/// Creates `dir` and its parents, reporting whether this call created it.
pub fn create_dir_tolerant(dir: &Path) -> Result<bool, NsError> {
    if dir.is_dir() {
        return Ok(false);
    }
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(false),
        Err(err) => Err(NsError::Directory(
            ErrorInfo::new("output_dir_create", err.to_string())
                .with_context("path", dir.display().to_string()),
        )),
    }
}
