//! Job supervision.
//!
//! [`JobSupervisor::start`] does the fallible launch work on the caller's path
//! (output directory, materialized configuration, spawn) and then hands the
//! running child to a tracked background task. That task drains the child's
//! merged stdout and stderr through a [`StreamTokenizer`], waits for the exit
//! status, writes the terminal state and reconciles artifacts on success.

use crate::artifacts::ArtifactReconciler;
use crate::config_doc::ConfigDocument;
use crate::error::{JobError, JobResult};
use crate::extract;
use crate::job::{JobId, JobRecord, JobStatus};
use crate::layout::JobLayout;
use crate::progress::{EventBus, JobEvent, JobEventSink};
use crate::settings::EngineSettings;
use crate::store::JobStore;
use crate::tokenizer::{StreamTokenizer, merge_readers};
use crate::trainer::TrainerLauncher;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Appended to a job's output when it is stopped by [`JobSupervisor::shutdown`].
pub const CANCELLED_LINE: &str = "cancelled: supervisor shutting down";

/// Error detail for a failed job that printed nothing.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Final result of one supervised job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Record as of the terminal transition.
    pub record: JobRecord,
    /// Every output token, in arrival order.
    pub output: Vec<String>,
    /// Reconciliation problems. They never change the terminal status.
    pub warnings: Vec<String>,
}

impl JobOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.record.status == JobStatus::Completed
    }
}

/// Handle to a job that has been launched.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    task: JoinHandle<JobResult<JobOutcome>>,
}

impl JobHandle {
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Resolves once the job is terminal and reconciliation has finished.
    pub async fn wait(self) -> JobResult<JobOutcome> {
        let job_id = self.job_id;
        self.task.await.map_err(|source| JobError::Task { job_id, source })?
    }
}

#[derive(Debug)]
pub struct JobSupervisor {
    store: JobStore,
    layout: JobLayout,
    launcher: Arc<dyn TrainerLauncher>,
    events: EventBus,
    staging_dir: PathBuf,
    chunk_size: usize,
    error_tail_lines: usize,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl JobSupervisor {
    #[must_use]
    pub fn new(store: JobStore, settings: &EngineSettings) -> Self {
        Self {
            store,
            layout: settings.layout(),
            launcher: Arc::new(settings.launcher()),
            events: EventBus::new(),
            staging_dir: settings.staging_dir(),
            chunk_size: settings.chunk_size,
            error_tail_lines: settings.error_tail_lines,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn TrainerLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    #[must_use]
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    #[must_use]
    pub fn layout(&self) -> &JobLayout {
        &self.layout
    }

    /// Live status changes and output lines for every job.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Number of jobs still being supervised.
    #[must_use]
    pub fn active_jobs(&self) -> usize {
        self.tracker.len()
    }

    /// Launches the trainer for a job in `generating`.
    ///
    /// Launch failures are recorded on the job as `error` and returned. Once
    /// this returns `Ok` the job is `running` and supervised in the background.
    pub async fn start(&self, job_id: &JobId, document: &ConfigDocument) -> JobResult<JobHandle> {
        if self.shutdown.is_cancelled() {
            self.record_launch_failure(job_id, &JobError::ShuttingDown).await;
            return Err(JobError::ShuttingDown);
        }

        // Nothing is touched on disk unless this call holds the launch claim.
        let record = self.store.claim_launch(job_id).await?;
        if record.config.is_none()
            && let Err(err) = self.store.set_config(job_id, document.value().clone()).await
        {
            let err = JobError::from(err);
            self.record_launch_failure(job_id, &err).await;
            return Err(err);
        }

        let launched = match self.launch(job_id, document) {
            Ok(launched) => launched,
            Err(err) => {
                self.record_launch_failure(job_id, &err).await;
                return Err(err);
            }
        };

        let Launched { child, stdout, stderr, job_dir, config_path } = launched;
        self.store
            .transition_with(job_id, JobStatus::Running, |record| record.output_dir = Some(job_dir))
            .await?;
        self.events.on_event(JobEvent::Status { job_id: job_id.clone(), status: JobStatus::Running });

        let run = JobRun {
            job_id: job_id.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            reconciler: ArtifactReconciler::new(self.layout.clone()),
            config_path,
            model_id: document.model_identifier(),
            chunk_size: self.chunk_size,
            error_tail_lines: self.error_tail_lines,
            cancel: self.shutdown.child_token(),
        };
        let task = self.tracker.spawn(run.supervise(child, merge_readers(stdout, stderr)));

        Ok(JobHandle { job_id: job_id.clone(), task })
    }

    /// Stops every running job and waits for all supervision to finish.
    ///
    /// Stopped jobs end in `error`; no new job can be started afterwards.
    pub async fn shutdown(&self) {
        info!(active_jobs = self.tracker.len(), "Shutting down job supervisor");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn launch(&self, job_id: &JobId, document: &ConfigDocument) -> JobResult<Launched> {
        let job_dir = self.layout.ensure_job_dir(job_id)?;
        let config_path = document.materialize(&self.staging_dir)?;

        let mut command = self.launcher.command(&config_path, &job_dir);
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                discard_staged(&config_path, job_id);
                return Err(JobError::Launch { program: self.launcher.program().to_string(), source });
            }
        };
        let stdout = child.stdout.take().ok_or_else(|| io::Error::other("trainer stdout was not captured"))?;
        let stderr = child.stderr.take().ok_or_else(|| io::Error::other("trainer stderr was not captured"))?;

        info!(
            job_id = %job_id,
            program = %self.launcher.program(),
            pid = ?child.id(),
            config = %config_path.display(),
            log_dir = %job_dir.display(),
            "Launched trainer"
        );
        Ok(Launched { child, stdout, stderr, job_dir, config_path })
    }

    async fn record_launch_failure(&self, job_id: &JobId, err: &JobError) {
        error!(job_id = %job_id, error = %err, "Failed to start job");
        match self.store.fail(job_id, err.to_string()).await {
            Ok(_) => self.events.on_event(JobEvent::Status { job_id: job_id.clone(), status: JobStatus::Error }),
            Err(store_err) => debug!(job_id = %job_id, error = %store_err, "Launch failure not recorded"),
        }
    }
}

struct Launched {
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    job_dir: PathBuf,
    config_path: PathBuf,
}

enum RunEnd {
    Exited(ExitStatus),
    Cancelled,
    Failed(io::Error),
}

/// Everything the background task of one job owns.
struct JobRun {
    job_id: JobId,
    store: JobStore,
    events: EventBus,
    reconciler: ArtifactReconciler,
    config_path: PathBuf,
    model_id: Option<String>,
    chunk_size: usize,
    error_tail_lines: usize,
    cancel: CancellationToken,
}

impl JobRun {
    async fn supervise<R: AsyncRead + Unpin>(self, mut child: Child, output: R) -> JobResult<JobOutcome> {
        let mut lines = Vec::new();
        let mut tokenizer = StreamTokenizer::with_chunk_size(output, self.chunk_size);

        let end = tokio::select! {
            () = self.cancel.cancelled() => RunEnd::Cancelled,
            result = self.drain(&mut tokenizer, &mut lines, &mut child) => match result {
                Ok(status) => RunEnd::Exited(status),
                Err(err) => RunEnd::Failed(err),
            },
        };
        drop(tokenizer);

        let detail = match end {
            RunEnd::Exited(status) if status.success() => return self.complete(lines).await,
            RunEnd::Exited(status) => {
                warn!(job_id = %self.job_id, exit_code = ?status.code(), "Trainer exited with failure");
                error_tail(&lines, self.error_tail_lines)
            }
            RunEnd::Cancelled => {
                kill(&mut child, &self.job_id).await;
                warn!(job_id = %self.job_id, "Job cancelled");
                lines.push(CANCELLED_LINE.to_string());
                error_tail(&lines, self.error_tail_lines)
            }
            RunEnd::Failed(err) => {
                kill(&mut child, &self.job_id).await;
                error!(job_id = %self.job_id, error = %err, "Lost track of trainer");
                if lines.is_empty() { err.to_string() } else { error_tail(&lines, self.error_tail_lines) }
            }
        };

        discard_staged(&self.config_path, &self.job_id);
        let record = self.store.fail(&self.job_id, detail).await?;
        self.events.on_event(JobEvent::Status { job_id: self.job_id.clone(), status: JobStatus::Error });
        Ok(JobOutcome { record, output: lines, warnings: Vec::new() })
    }

    async fn drain<R: AsyncRead + Unpin>(
        &self,
        tokenizer: &mut StreamTokenizer<R>,
        lines: &mut Vec<String>,
        child: &mut Child,
    ) -> io::Result<ExitStatus> {
        while let Some(line) = tokenizer.next_token().await? {
            self.events.on_event(JobEvent::Output { job_id: self.job_id.clone(), line: line.clone() });
            lines.push(line);
        }
        child.wait().await
    }

    async fn complete(self, lines: Vec<String>) -> JobResult<JobOutcome> {
        let record = self.store.transition(&self.job_id, JobStatus::Completed).await?;
        self.events.on_event(JobEvent::Status { job_id: self.job_id.clone(), status: JobStatus::Completed });
        info!(job_id = %self.job_id, lines = lines.len(), "Job completed");

        let experiment_id = extract::experiment_identifier(&lines);
        let warnings = self.reconcile(experiment_id).await;
        discard_staged(&self.config_path, &self.job_id);
        Ok(JobOutcome { record, output: lines, warnings })
    }

    /// Best-effort artifact reconciliation. Returns what went wrong.
    ///
    /// Runs only when both the model and the experiment identifier are known.
    async fn reconcile(&self, experiment_id: Option<String>) -> Vec<String> {
        let (Some(model_id), Some(experiment_id)) = (self.model_id.clone(), experiment_id) else {
            debug!(
                job_id = %self.job_id,
                model_id = ?self.model_id,
                "Model or experiment identifier missing, skipping reconciliation"
            );
            return Vec::new();
        };

        let reconciler = self.reconciler.clone();
        let job_id = self.job_id.clone();
        let config_path = self.config_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut warnings = Vec::new();
            match reconciler.copy_checkpoint_artifacts(&job_id, &experiment_id, &model_id, &config_path) {
                Ok(report) => warnings.extend(report.failures.iter().map(ToString::to_string)),
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "Checkpoint artifacts not copied");
                    warnings.push(err.to_string());
                }
            }
            match reconciler.consolidate_logs(&job_id, &model_id) {
                Ok(report) => warnings.extend(report.failures.iter().map(ToString::to_string)),
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "Nested logs not consolidated");
                    warnings.push(err.to_string());
                }
            }
            warnings
        })
        .await;

        result.unwrap_or_else(|err| {
            error!(job_id = %self.job_id, error = %err, "Reconciliation task failed");
            vec![format!("reconciliation task failed: {err}")]
        })
    }
}

/// Removes a materialized configuration once the job no longer needs it.
fn discard_staged(config_path: &Path, job_id: &JobId) {
    if let Err(err) = std::fs::remove_file(config_path) {
        debug!(job_id = %job_id, config = %config_path.display(), error = %err, "Staged configuration not removed");
    }
}

async fn kill(child: &mut Child, job_id: &JobId) {
    if let Err(err) = child.kill().await {
        debug!(job_id = %job_id, error = %err, "Trainer already gone");
    }
}

/// Last `n` output lines joined by `\n`, or [`UNKNOWN_ERROR`].
fn error_tail(lines: &[String], n: usize) -> String {
    if lines.is_empty() {
        return UNKNOWN_ERROR.to_string();
    }
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("line {i}")).collect()
    }

    #[test]
    fn test_error_tail() {
        assert_eq!(error_tail(&[], 10), UNKNOWN_ERROR);
        assert_eq!(error_tail(&lines(3), 10), "line 1\nline 2\nline 3");
        let expected: Vec<String> = (3..=12).map(|i| format!("line {i}")).collect();
        assert_eq!(error_tail(&lines(12), 10), expected.join("\n"));
    }
}
