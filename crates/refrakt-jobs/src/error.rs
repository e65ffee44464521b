use crate::config_doc::ConfigDocError;
use crate::job::{JobId, JobStatus};
use crate::store::StoreError;
use refrakt_abstraction::ModelError;
use thiserror::Error;

pub type JobResult<T> = std::result::Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    /// The text model could not produce a configuration.
    #[error("Model error: {0}")]
    Generation(#[from] ModelError),

    /// A configuration was produced but is not usable.
    #[error("Invalid YAML generated: {0}")]
    ConfigParse(#[from] ConfigDocError),

    /// The trainer executable could not be started.
    #[error("Failed to launch trainer: {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("job {job_id} is not completed (status: {status})")]
    NotCompleted { job_id: JobId, status: JobStatus },

    #[error("supervisor is shutting down")]
    ShuttingDown,

    #[error("supervision task for job {job_id} failed: {source}")]
    Task {
        job_id: JobId,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
