//! Refrakt Jobs
//!
//! Orchestration engine for training jobs:
//! - Tracking jobs through `generating -> running -> completed | error` (`JobStore`)
//! - Launching and supervising the trainer process (`JobSupervisor`)
//! - Tokenizing its output, including carriage-return progress bars (`StreamTokenizer`)
//! - Pulling scattered checkpoints and logs into one directory per job (`ArtifactReconciler`)
//! - Turning a natural-language request into a running job (`JobService`)

pub mod artifacts;
pub mod config_doc;
pub mod error;
pub mod extract;
pub mod job;
pub mod layout;
pub mod progress;
pub mod service;
pub mod settings;
pub mod store;
pub mod supervisor;
pub mod tokenizer;
pub mod trainer;

pub use artifacts::{ArtifactReconciler, ReconcileError, ReconcileReport};
pub use config_doc::{ConfigDocError, ConfigDocument, unwrap_formatting_noise};
pub use error::{JobError, JobResult};
pub use extract::{experiment_identifier, model_identifier};
pub use job::{JobAccepted, JobId, JobRecord, JobRequest, JobStatus};
pub use layout::JobLayout;
pub use progress::{EventBus, JobEvent, JobEventSink};
pub use service::{JobService, Submission};
pub use settings::{EngineSettings, SettingsError, SettingsResult};
pub use store::{JobStore, StoreError};
pub use supervisor::{JobHandle, JobOutcome, JobSupervisor};
pub use tokenizer::{StreamTokenizer, merge_readers};
pub use trainer::{CliTrainer, TrainerLauncher};
