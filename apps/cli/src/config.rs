//! Settings loading for the CLI.

use anyhow::Context;
use refrakt_jobs::EngineSettings;
use std::path::Path;

/// Load engine settings.
///
/// Precedence:
/// 1. Environment variables (`REFRAKT_*`)
/// 2. The file given with `--config`, or `./refrakt.toml`
/// 3. Defaults
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<EngineSettings> {
    let settings = match path {
        Some(path) => {
            let mut settings = EngineSettings::load_from_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?;
            settings.apply_env_overrides();
            settings
        }
        None => EngineSettings::discover_and_load().context("Failed to load ./refrakt.toml")?,
    };
    settings.validate()?;
    tracing::debug!(settings = ?settings, "Loaded settings");
    Ok(settings)
}
