//! Command implementations for the Refrakt CLI.

pub mod check_model;
pub mod run;

use refrakt_abstraction::{GenerationParameters, TextModel};
use refrakt_jobs::{EngineSettings, JobService, JobStore, JobSupervisor};
use std::sync::Arc;

/// Wires a job service from settings around `model`.
pub fn build_service(settings: &EngineSettings, model: Arc<dyn TextModel>, template: String) -> JobService {
    let supervisor = Arc::new(JobSupervisor::new(JobStore::new(), settings));
    let defaults = GenerationParameters::default();
    let parameters = GenerationParameters {
        temperature: settings.generation.temperature.or(defaults.temperature),
        ..defaults
    };
    JobService::new(model, template, supervisor).with_parameters(parameters)
}
