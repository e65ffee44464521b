use crate::job::JobId;
use std::path::{Path, PathBuf};

/// Filesystem layout shared by the supervisor and the artifact reconciler.
///
/// Default layout is `./jobs/<job_id>/` for what we own and
/// `./checkpoints/<model>_<experiment>/` for what the trainer writes.
#[derive(Debug, Clone)]
pub struct JobLayout {
    jobs_root: PathBuf,
    checkpoints_root: PathBuf,
}

impl JobLayout {
    #[must_use]
    pub fn new(jobs_root: PathBuf, checkpoints_root: PathBuf) -> Self {
        Self { jobs_root, checkpoints_root }
    }

    /// Layout rooted in a working directory.
    #[must_use]
    pub fn for_working_dir(root: &Path) -> Self {
        Self::new(root.join("jobs"), root.join("checkpoints"))
    }

    #[must_use]
    pub fn jobs_root(&self) -> &Path {
        &self.jobs_root
    }

    #[must_use]
    pub fn checkpoints_root(&self) -> &Path {
        &self.checkpoints_root
    }

    #[must_use]
    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.jobs_root.join(job_id.as_str())
    }

    /// Where the trainer puts checkpoints and explanations for one run.
    #[must_use]
    pub fn checkpoint_dir(&self, model_id: &str, experiment_id: &str) -> PathBuf {
        self.checkpoints_root.join(format!("{model_id}_{experiment_id}"))
    }

    /// The trainer nests its own logs one level below the log dir we give it.
    #[must_use]
    pub fn nested_log_dir(&self, job_id: &JobId, model_id: &str) -> PathBuf {
        self.job_dir(job_id).join(model_id)
    }

    pub fn ensure_job_dir(&self, job_id: &JobId) -> std::io::Result<PathBuf> {
        let dir = self.job_dir(job_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl Default for JobLayout {
    fn default() -> Self {
        Self::for_working_dir(Path::new("."))
    }
}
