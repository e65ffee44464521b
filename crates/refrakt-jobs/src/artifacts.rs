//! Post-run reconciliation of trainer artifacts into the job directory.
//!
//! The trainer writes checkpoints under its own checkpoints root and nests log
//! files one level below the log directory it was given. Both operations here
//! pull those files into `<jobs-root>/<job-id>/`. They are best effort: every
//! entry is attempted, failures are collected on the report and logged.

use crate::job::JobId;
use crate::layout::JobLayout;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("checkpoint directory not found: {}", .0.display())]
    CheckpointDirNotFound(PathBuf),

    #[error("failed to list {}: {source}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to copy {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move {}: {source}", path.display())]
    Move {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What one reconciliation pass did.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Destination paths written.
    pub transferred: Vec<PathBuf>,
    /// Entries that could not be copied or moved.
    pub failures: Vec<ReconcileError>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, result: Result<PathBuf, ReconcileError>) {
        match result {
            Ok(dest) => self.transferred.push(dest),
            Err(err) => {
                warn!(error = %err, "Artifact reconciliation step failed");
                self.failures.push(err);
            }
        }
    }
}

/// Moves trainer output into a job's canonical directory.
#[derive(Debug, Clone)]
pub struct ArtifactReconciler {
    layout: JobLayout,
}

impl ArtifactReconciler {
    #[must_use]
    pub fn new(layout: JobLayout) -> Self {
        Self { layout }
    }

    /// Copies `<checkpoints>/<model>_<experiment>/*` into the job directory,
    /// then copies the run's configuration in under its own name and under
    /// the model identifier.
    ///
    /// Existing files are overwritten and existing directories replaced.
    pub fn copy_checkpoint_artifacts(
        &self,
        job_id: &JobId,
        experiment_id: &str,
        model_id: &str,
        config_path: &Path,
    ) -> Result<ReconcileReport, ReconcileError> {
        let source = self.layout.checkpoint_dir(model_id, experiment_id);
        if !source.is_dir() {
            return Err(ReconcileError::CheckpointDirNotFound(source));
        }

        let job_dir = self.layout.job_dir(job_id);
        fs::create_dir_all(&job_dir)
            .map_err(|source| ReconcileError::Copy { path: job_dir.clone(), source })?;

        let entries = fs::read_dir(&source)
            .map_err(|err| ReconcileError::List { path: source.clone(), source: err })?;

        let mut report = ReconcileReport::default();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    report.record(Err(ReconcileError::List { path: source.clone(), source: err }));
                    continue;
                }
            };
            let dest = job_dir.join(entry.file_name());
            report.record(
                replace_with_copy(&entry.path(), &dest)
                    .map(|()| dest)
                    .map_err(|err| ReconcileError::Copy { path: entry.path(), source: err }),
            );
        }

        let config_name = config_path
            .file_name()
            .map_or_else(|| PathBuf::from("config.yaml"), PathBuf::from);
        let extension = config_path.extension().and_then(|e| e.to_str()).unwrap_or("yaml");
        for dest in [job_dir.join(config_name), job_dir.join(format!("{model_id}.{extension}"))] {
            if dest == config_path {
                continue;
            }
            report.record(
                fs::copy(config_path, &dest)
                    .map(|_| dest)
                    .map_err(|err| ReconcileError::Copy { path: config_path.to_path_buf(), source: err }),
            );
        }

        info!(
            job_id = %job_id,
            source = %source.display(),
            copied = report.transferred.len(),
            failed = report.failures.len(),
            "Copied checkpoint artifacts"
        );
        Ok(report)
    }

    /// Moves everything under `<job-dir>/<model>/` up into the job directory
    /// and removes the subdirectory once it is empty.
    ///
    /// A name that already exists at the top level is moved as
    /// `<model>_<name>` instead.
    pub fn consolidate_logs(&self, job_id: &JobId, model_id: &str) -> Result<ReconcileReport, ReconcileError> {
        let job_dir = self.layout.job_dir(job_id);
        let nested = self.layout.nested_log_dir(job_id, model_id);

        let entries = match fs::read_dir(&nested) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(job_id = %job_id, dir = %nested.display(), "No nested log directory");
                return Ok(ReconcileReport::default());
            }
            Err(err) => return Err(ReconcileError::List { path: nested, source: err }),
        };

        let mut report = ReconcileReport::default();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    report.record(Err(ReconcileError::List { path: nested.clone(), source: err }));
                    continue;
                }
            };
            let name = entry.file_name();
            let mut dest = job_dir.join(&name);
            if dest.exists() {
                dest = job_dir.join(format!("{model_id}_{}", name.to_string_lossy()));
            }
            report.record(
                fs::rename(entry.path(), &dest)
                    .map(|()| dest)
                    .map_err(|err| ReconcileError::Move { path: entry.path(), source: err }),
            );
        }

        // Still holding something we couldn't move; leave it in place.
        if let Err(err) = fs::remove_dir(&nested) {
            debug!(dir = %nested.display(), error = %err, "Nested log directory not removed");
        }

        info!(
            job_id = %job_id,
            moved = report.transferred.len(),
            failed = report.failures.len(),
            "Consolidated nested logs"
        );
        Ok(report)
    }
}

/// Copies `src` to `dest`, replacing whatever is at `dest`.
fn replace_with_copy(src: &Path, dest: &Path) -> io::Result<()> {
    let dest_meta = fs::symlink_metadata(dest).ok();
    if src.is_dir() {
        match dest_meta {
            Some(meta) if meta.is_dir() => fs::remove_dir_all(dest)?,
            Some(_) => fs::remove_file(dest)?,
            None => {}
        }
        copy_dir_recursive(src, dest)
    } else {
        if dest_meta.is_some_and(|meta| meta.is_dir()) {
            fs::remove_dir_all(dest)?;
        }
        fs::copy(src, dest).map(|_| ())
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
