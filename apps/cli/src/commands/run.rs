//! `rfk run` and `rfk exec`.

use super::build_service;
use anyhow::{Context, Result};
use colored::Colorize;
use refrakt_jobs::{
    ConfigDocument, EngineSettings, JobError, JobEvent, JobOutcome, JobRequest, JobService, JobStatus, Submission,
};
use refrakt_models::{GeminiModel, ScriptedModel};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Generates a configuration from `prompt` and runs it. Returns whether the job completed.
pub async fn execute_prompt(settings: &EngineSettings, prompt: String, user_id: String, quiet: bool) -> Result<bool> {
    let template = settings.load_prompt_template()?;
    let model = GeminiModel::new(settings.generation.model.clone())
        .context("Failed to configure the generation model (is GEMINI_API_KEY set?)")?;
    let service = build_service(settings, Arc::new(model), template);

    let events = service.supervisor().subscribe();
    let submission = service.submit(JobRequest::new(prompt).with_user_id(user_id)).await;
    follow(&service, submission, events, quiet).await
}

/// Runs an existing configuration file. Returns whether the job completed.
pub async fn execute_file(settings: &EngineSettings, path: &Path, user_id: String, quiet: bool) -> Result<bool> {
    let document =
        ConfigDocument::from_file(path).with_context(|| format!("Failed to read configuration {}", path.display()))?;

    // Nothing is generated on this path.
    let service = build_service(settings, Arc::new(ScriptedModel::new("offline")), String::new());

    let events = service.supervisor().subscribe();
    let request = JobRequest::new(format!("exec {}", path.display())).with_user_id(user_id);
    let submission = service.submit_config(&document, request).await;
    follow(&service, submission, events, quiet).await
}

async fn follow(
    service: &JobService,
    submission: Result<Submission, JobError>,
    mut events: broadcast::Receiver<JobEvent>,
    quiet: bool,
) -> Result<bool> {
    let Submission { accepted, handle } = match submission {
        Ok(submission) => submission,
        Err(err) => {
            eprintln!("{} {err}", "Job failed to start:".red().bold());
            for record in service.list().await {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            return Ok(false);
        }
    };
    eprintln!("{} {} ({})", "Job".bold(), accepted.job_id.to_string().cyan(), accepted.message);

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut interrupted = false;
    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome?,
            event = events.recv() => match event {
                Ok(event) => print_event(&event, quiet),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Output display fell behind"),
                Err(RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("{}", "Interrupted, stopping trainer...".yellow());
                service.supervisor().shutdown().await;
            }
        }
    };
    loop {
        match events.try_recv() {
            Ok(event) => print_event(&event, quiet),
            Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }

    report(&outcome)?;
    Ok(outcome.is_success())
}

fn print_event(event: &JobEvent, quiet: bool) {
    match event {
        JobEvent::Output { line, .. } if !quiet => println!("{line}"),
        JobEvent::Output { .. } => {}
        JobEvent::Status { status, .. } => {
            let status = match status {
                JobStatus::Completed => status.as_str().green(),
                JobStatus::Error => status.as_str().red(),
                JobStatus::Generating | JobStatus::Running => status.as_str().cyan(),
            };
            eprintln!("{} {status}", "status:".bold());
        }
    }
}

fn report(outcome: &JobOutcome) -> Result<()> {
    for warning in &outcome.warnings {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }
    println!("{}", serde_json::to_string_pretty(&outcome.record)?);
    Ok(())
}
