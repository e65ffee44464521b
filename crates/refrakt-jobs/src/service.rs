//! Request acceptance: prompt in, running job out.

use crate::config_doc::ConfigDocument;
use crate::error::{JobError, JobResult};
use crate::job::{JobAccepted, JobId, JobRecord, JobRequest, JobStatus};
use crate::store::{JobStore, StoreError};
use crate::supervisor::{JobHandle, JobSupervisor};
use refrakt_abstraction::{GenerationParameters, ModelResponse, TextModel};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Prompt sent by [`JobService::check_model`].
pub const PROBE_PROMPT: &str = "Hello";

/// What a successful submission hands back.
#[derive(Debug)]
pub struct Submission {
    pub accepted: JobAccepted,
    pub handle: JobHandle,
}

pub struct JobService {
    model: Arc<dyn TextModel>,
    prompt_template: String,
    parameters: GenerationParameters,
    supervisor: Arc<JobSupervisor>,
}

impl fmt::Debug for JobService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobService")
            .field("model_id", &self.model.model_id())
            .field("template_len", &self.prompt_template.len())
            .finish_non_exhaustive()
    }
}

impl JobService {
    #[must_use]
    pub fn new(model: Arc<dyn TextModel>, prompt_template: impl Into<String>, supervisor: Arc<JobSupervisor>) -> Self {
        Self { model, prompt_template: prompt_template.into(), parameters: GenerationParameters::default(), supervisor }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn supervisor(&self) -> &Arc<JobSupervisor> {
        &self.supervisor
    }

    fn store(&self) -> &JobStore {
        self.supervisor.store()
    }

    #[must_use]
    pub fn render_prompt(&self, request: &str) -> String {
        format!("{}\n\nUSER_REQUEST: {request}\n---\nYAML:", self.prompt_template)
    }

    /// Generates a configuration for `request` and launches it.
    ///
    /// Generation, parse and launch failures leave the job in `error` and are
    /// returned.
    pub async fn submit(&self, request: JobRequest) -> JobResult<Submission> {
        let job_id = self.accept(&request).await;

        let prompt = self.render_prompt(&request.prompt);
        debug!(job_id = %job_id, prompt_len = prompt.len(), model_id = %self.model.model_id(), "Generating configuration");
        let raw = match self.model.generate_text(&prompt, Some(self.parameters.clone())).await {
            Ok(ModelResponse { content, .. }) => content,
            Err(err) => return Err(self.reject(&job_id, err.into()).await),
        };

        let document = match ConfigDocument::parse(&raw) {
            Ok(document) => document,
            Err(err) => return Err(self.reject(&job_id, err.into()).await),
        };
        debug!(job_id = %job_id, model = ?document.model_identifier(), "Configuration parsed");

        self.launch(job_id, &document).await
    }

    /// Launches a ready-made configuration, skipping generation.
    pub async fn submit_config(&self, document: &ConfigDocument, request: JobRequest) -> JobResult<Submission> {
        let job_id = self.accept(&request).await;
        self.launch(job_id, document).await
    }

    pub async fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.store().get(job_id).await
    }

    pub async fn list(&self) -> Vec<JobRecord> {
        self.store().list().await
    }

    /// Output directory of a completed job.
    pub async fn result_path(&self, job_id: &JobId) -> JobResult<PathBuf> {
        let record = self.store().get(job_id).await.ok_or_else(|| StoreError::NotFound(job_id.clone()))?;
        match (record.status, record.output_dir) {
            (JobStatus::Completed, Some(dir)) => Ok(dir),
            (status, _) => Err(JobError::NotCompleted { job_id: job_id.clone(), status }),
        }
    }

    /// Sends a trivial prompt to the text model.
    pub async fn check_model(&self) -> JobResult<ModelResponse> {
        Ok(self.model.generate_text(PROBE_PROMPT, None).await?)
    }

    async fn accept(&self, request: &JobRequest) -> JobId {
        let job_id = JobId::new();
        self.store().upsert(JobRecord::new(job_id.clone(), request)).await;
        info!(job_id = %job_id, user_id = %request.user_id, "Accepted job request");
        job_id
    }

    async fn launch(&self, job_id: JobId, document: &ConfigDocument) -> JobResult<Submission> {
        if let Err(err) = self.store().set_config(&job_id, document.value().clone()).await {
            return Err(self.reject(&job_id, err.into()).await);
        }
        let handle = self.supervisor.start(&job_id, document).await?;
        let accepted = JobAccepted {
            job_id,
            status: JobStatus::Running,
            message: "Job started successfully".to_string(),
        };
        Ok(Submission { accepted, handle })
    }

    async fn reject(&self, job_id: &JobId, err: JobError) -> JobError {
        error!(job_id = %job_id, error = %err, "Job rejected");
        if let Err(store_err) = self.store().fail(job_id, err.to_string()).await {
            debug!(job_id = %job_id, error = %store_err, "Rejection not recorded");
        }
        err
    }
}
