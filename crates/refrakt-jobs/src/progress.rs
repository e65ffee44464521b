use crate::job::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

/// Capacity of the live event channel. Slow subscribers lag, they never block jobs.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Status { job_id: JobId, status: JobStatus },
    Output { job_id: JobId, line: String },
}

impl JobEvent {
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Status { job_id, .. } | Self::Output { job_id, .. } => job_id,
        }
    }
}

pub trait JobEventSink: Send + Sync {
    fn on_event(&self, event: JobEvent);
}

/// Logs output lines and fans every event out to live subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl JobEventSink for EventBus {
    fn on_event(&self, event: JobEvent) {
        match &event {
            JobEvent::Output { job_id, line } => {
                info!(target: "refrakt_jobs::output", job_id = %job_id, "{line}");
            }
            JobEvent::Status { job_id, status } => {
                info!(job_id = %job_id, status = %status, "Job status changed");
            }
        }
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}
