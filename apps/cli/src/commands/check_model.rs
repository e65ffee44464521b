//! `rfk check-model`: probe the generation model.

use super::build_service;
use anyhow::Result;
use refrakt_jobs::EngineSettings;
use refrakt_models::GeminiModel;
use serde_json::json;
use std::sync::Arc;

pub async fn execute(settings: &EngineSettings) -> Result<bool> {
    let model_id = settings.generation.model.clone();
    let model = match GeminiModel::new(model_id.clone()) {
        Ok(model) => model,
        Err(err) => {
            let out = json!({"status": "error", "model": model_id, "error": err.to_string(), "api_key_configured": false});
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(false);
        }
    };

    let service = build_service(settings, Arc::new(model), String::new());
    let (out, ok) = match service.check_model().await {
        Ok(response) => (
            json!({"status": "success", "model": model_id, "response": response.content, "api_key_configured": true}),
            true,
        ),
        Err(err) => (json!({"status": "error", "model": model_id, "error": err.to_string(), "api_key_configured": true}), false),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(ok)
}
