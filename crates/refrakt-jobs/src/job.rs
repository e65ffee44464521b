use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier for a job. Also names the job's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The configuration is being produced.
    Generating,
    /// The trainer process has been launched.
    Running,
    /// The trainer exited with code zero.
    Completed,
    /// Generation, parsing, launch or training failed.
    Error,
}

impl JobStatus {
    /// Checks if a job in this state may move to `to`.
    ///
    /// Transitions only move forward; nothing leaves a terminal state and no
    /// state is re-entered.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Generating, Self::Running | Self::Error)
                | (Self::Running, Self::Completed | Self::Error)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller submits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub prompt: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

impl JobRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), user_id: default_user_id() }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }
}

/// Tracked state of a job.
///
/// Serializes to the status shape reported to callers. `status` and
/// `updated_at` are only ever changed together through [`JobStore`].
///
/// [`JobStore`]: crate::store::JobStore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub prompt: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    #[serde(rename = "result_path", default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    /// A fresh record in `generating`.
    #[must_use]
    pub fn new(job_id: JobId, request: &JobRequest) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Generating,
            created_at: now,
            updated_at: now,
            prompt: request.prompt.clone(),
            user_id: request.user_id.clone(),
            config: None,
            output_dir: None,
            error: None,
        }
    }
}

/// Acknowledgement handed back once a job has been launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_only_move_forward() {
        assert!(JobStatus::Generating.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Generating.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Generating.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Generating.can_transition_to(JobStatus::Generating));

        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Generating));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Running));

        for terminal in [JobStatus::Completed, JobStatus::Error] {
            assert!(terminal.is_terminal());
            for to in [JobStatus::Generating, JobStatus::Running, JobStatus::Completed, JobStatus::Error] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_record_serializes_to_status_shape() {
        let request = JobRequest::new("train a resnet").with_user_id("u-1");
        let mut record = JobRecord::new(JobId::from("job-1"), &request);
        record.output_dir = Some(PathBuf::from("jobs/job-1"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["job_id"], "job-1");
        assert_eq!(json["status"], "generating");
        assert_eq!(json["result_path"], "jobs/job-1");
        assert_eq!(json["user_id"], "u-1");
        assert!(json.get("config").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_request_defaults_user_id() {
        let request: JobRequest = serde_json::from_str(r#"{"prompt":"p"}"#).unwrap();
        assert_eq!(request.user_id, "anonymous");
    }
}
