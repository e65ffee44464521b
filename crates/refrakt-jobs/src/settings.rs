//! Engine settings.
//!
//! Loaded from a TOML file (`./refrakt.toml` unless told otherwise), every
//! field defaulted, then overridden from `REFRAKT_*` environment variables.

use crate::layout::JobLayout;
use crate::tokenizer::DEFAULT_CHUNK_SIZE;
use crate::trainer::CliTrainer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Settings file looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "refrakt.toml";

/// Used when the configured prompt template file doesn't exist.
pub const FALLBACK_PROMPT_TEMPLATE: &str = "You write training configurations for the refrakt \
trainer. Answer with a single YAML document and nothing else. The document must contain a \
`model` section with a `name`; autoencoder models also set `model.params.variant`.";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings file not found: {0}")]
    NotFound(String),

    #[error("Failed to read settings file: {0}")]
    ReadError(String),

    #[error("Failed to parse settings file: {0}")]
    ParseError(String),

    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
}

pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Parent of every `<job-id>/` output directory.
    pub jobs_root: PathBuf,
    /// Where the trainer writes `<model>_<experiment>/` checkpoint directories.
    pub checkpoints_root: PathBuf,
    /// Where materialized configurations are written before launch.
    /// Defaults to a directory under the system temp dir.
    pub staging_dir: Option<PathBuf>,
    /// Read size for the output tokenizer.
    pub chunk_size: usize,
    /// Output lines kept as the error detail of a failed job.
    pub error_tail_lines: usize,
    pub trainer: TrainerSettings,
    pub generation: GenerationSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerSettings {
    pub program: String,
    /// Arguments placed before `--config`.
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub model: String,
    pub prompt_template: PathBuf,
    pub temperature: Option<f32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            jobs_root: PathBuf::from("jobs"),
            checkpoints_root: PathBuf::from("checkpoints"),
            staging_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            error_tail_lines: 10,
            trainer: TrainerSettings::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self { program: "refrakt".to_string(), args: Vec::new() }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self { model: "gemini-2.5-pro".to_string(), prompt_template: PathBuf::from("PROMPT.md"), temperature: None }
    }
}

impl EngineSettings {
    /// Load settings from a TOML file.
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        if !path.exists() {
            return Err(SettingsError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::ReadError(format!("{}: {}", path.display(), e)))?;

        let settings: Self =
            toml::from_str(&content).map_err(|e| SettingsError::ParseError(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads `./refrakt.toml` if present, defaults otherwise, then applies
    /// environment overrides.
    pub fn discover_and_load() -> SettingsResult<Self> {
        let path = Path::new(DEFAULT_SETTINGS_FILE);
        let mut settings = if path.exists() {
            debug!(path = %path.display(), "Loading settings");
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Applies `REFRAKT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REFRAKT_JOBS_ROOT") {
            self.jobs_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("REFRAKT_CHECKPOINTS_ROOT") {
            self.checkpoints_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("REFRAKT_TRAINER") {
            self.trainer.program = v;
        }
        if let Some(v) = lookup("REFRAKT_PROMPT_TEMPLATE") {
            self.generation.prompt_template = PathBuf::from(v);
        }
        if let Some(v) = lookup("REFRAKT_GENERATION_MODEL") {
            self.generation.model = v;
        }
    }

    pub fn validate(&self) -> SettingsResult<()> {
        if self.chunk_size == 0 {
            return Err(SettingsError::InvalidValue("chunk_size must be greater than zero".to_string()));
        }
        if self.error_tail_lines == 0 {
            return Err(SettingsError::InvalidValue("error_tail_lines must be greater than zero".to_string()));
        }
        if self.trainer.program.trim().is_empty() {
            return Err(SettingsError::InvalidValue("trainer.program must not be empty".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn layout(&self) -> JobLayout {
        JobLayout::new(self.jobs_root.clone(), self.checkpoints_root.clone())
    }

    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(|| std::env::temp_dir().join("refrakt-configs"))
    }

    #[must_use]
    pub fn launcher(&self) -> CliTrainer {
        CliTrainer::new(self.trainer.program.clone()).with_leading_args(self.trainer.args.clone())
    }

    /// Reads the generation prompt template, falling back to a built-in one
    /// when the file is missing.
    pub fn load_prompt_template(&self) -> SettingsResult<String> {
        let path = &self.generation.prompt_template;
        match std::fs::read_to_string(path) {
            Ok(template) => Ok(template),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Prompt template not found, using built-in template");
                Ok(FALLBACK_PROMPT_TEMPLATE.to_string())
            }
            Err(e) => Err(SettingsError::ReadError(format!("{}: {}", path.display(), e))),
        }
    }
}
