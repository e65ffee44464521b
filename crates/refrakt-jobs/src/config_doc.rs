//! Configuration documents produced for the trainer.
//!
//! Generated text is cleaned of the wrappers language models like to put around
//! YAML, parsed, and checked to be a mapping before it is accepted. The cleaned
//! text is what gets written to disk for the trainer to read.

use crate::extract;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Leading wrappers recognized around a generated document, checked in order.
pub const LEADING_WRAPPERS: &[&str] = &["```yaml\n", "```yml\n", "```\n", "yaml\n"];

/// Trailing wrapper recognized around a generated document.
pub const TRAILING_WRAPPER: &str = "```";

#[derive(Debug, Error)]
pub enum ConfigDocError {
    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document is empty")]
    Empty,

    #[error("top level must be a mapping, found {0}")]
    NotAMapping(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Strips one recognized leading wrapper and a trailing fence.
///
/// Returns `text` unchanged when no wrapper is present.
#[must_use]
pub fn unwrap_formatting_noise(text: &str) -> &str {
    let trimmed = text.trim();
    let leading = LEADING_WRAPPERS.iter().find(|w| starts_with_wrapper(trimmed, w));
    let body = leading.map_or(trimmed, |w| strip_wrapper(trimmed, w));
    let (body, trailing) = match body.strip_suffix(TRAILING_WRAPPER) {
        Some(stripped) => (stripped, true),
        None => (body, false),
    };

    if leading.is_none() && !trailing {
        return text;
    }
    body.trim()
}

/// `starts_with` that accepts `\r\n` wherever a wrapper has `\n`.
fn starts_with_wrapper(text: &str, wrapper: &str) -> bool {
    let head = wrapper.trim_end_matches('\n');
    text.strip_prefix(head).is_some_and(|rest| rest.starts_with('\n') || rest.starts_with("\r\n"))
}

fn strip_wrapper<'a>(text: &'a str, wrapper: &str) -> &'a str {
    let head = wrapper.trim_end_matches('\n');
    let rest = &text[head.len()..];
    rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')).unwrap_or(rest)
}

/// A parsed, structurally valid configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    text: String,
    value: Value,
}

impl ConfigDocument {
    /// Unwraps and parses generated text.
    pub fn parse(raw: &str) -> Result<Self, ConfigDocError> {
        let text = unwrap_formatting_noise(raw).trim();
        if text.is_empty() {
            return Err(ConfigDocError::Empty);
        }

        let value: Value = serde_yaml::from_str(text)?;
        match &value {
            Value::Object(_) => Ok(Self { text: text.to_string(), value }),
            Value::Null => Err(ConfigDocError::Empty),
            Value::Bool(_) => Err(ConfigDocError::NotAMapping("a boolean")),
            Value::Number(_) => Err(ConfigDocError::NotAMapping("a number")),
            Value::String(_) => Err(ConfigDocError::NotAMapping("a string")),
            Value::Array(_) => Err(ConfigDocError::NotAMapping("a sequence")),
        }
    }

    /// Reads and parses a document from disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigDocError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn model_identifier(&self) -> Option<String> {
        extract::model_identifier(Some(&self.value))
    }

    /// Writes the document to a fresh `job-*.yaml` file under `dir` that
    /// outlives this call.
    pub fn materialize(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new().prefix("job-").suffix(".yaml").tempfile_in(dir)?;
        file.write_all(self.text.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        let (_, path) = file.keep()?;
        Ok(path)
    }
}
