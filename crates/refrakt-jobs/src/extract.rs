//! Identifier extraction from configurations and trainer output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Model family whose identifier also depends on a variant.
pub const PARAMETRIZED_FAMILY: &str = "autoencoder";

/// Variant assumed when a parametrized family doesn't name one.
pub const DEFAULT_VARIANT: &str = "simple";

/// `Experiment ID:` followed by a `YYYYMMDD_HHMMSS` token.
static EXPERIMENT_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Experiment ID:\s*([0-9]{8}_[0-9]{6})\b").expect("experiment id pattern is valid")
});

/// Derives the model identifier from `model.name` (and `model.params.variant`
/// for the autoencoder family).
#[must_use]
pub fn model_identifier(config: Option<&Value>) -> Option<String> {
    let model = config?.get("model")?;
    let name = model.get("name")?.as_str()?;

    if name != PARAMETRIZED_FAMILY {
        return Some(name.to_string());
    }

    let variant = model
        .get("params")
        .and_then(|params| params.get("variant"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_VARIANT);
    Some(format!("{name}_{variant}"))
}

/// Returns the first experiment identifier announced in `lines`.
#[must_use]
pub fn experiment_identifier<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    lines
        .iter()
        .find_map(|line| EXPERIMENT_ID.captures(line.as_ref()))
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_identifier_parametrized_family() {
        let config = json!({"model": {"name": "autoencoder", "params": {"variant": "vq"}}});
        assert_eq!(model_identifier(Some(&config)).as_deref(), Some("autoencoder_vq"));

        let config = json!({"model": {"name": "autoencoder"}});
        assert_eq!(model_identifier(Some(&config)).as_deref(), Some("autoencoder_simple"));

        let config = json!({"model": {"name": "autoencoder", "params": {"lr": 0.1}}});
        assert_eq!(model_identifier(Some(&config)).as_deref(), Some("autoencoder_simple"));
    }

    #[test]
    fn test_model_identifier_plain_name() {
        let config = json!({"model": {"name": "resnet18", "params": {"variant": "ignored"}}});
        assert_eq!(model_identifier(Some(&config)).as_deref(), Some("resnet18"));
    }

    #[test]
    fn test_model_identifier_absent() {
        assert_eq!(model_identifier(None), None);
        assert_eq!(model_identifier(Some(&json!({"dataset": {"name": "mnist"}}))), None);
        assert_eq!(model_identifier(Some(&json!({"model": {}}))), None);
        assert_eq!(model_identifier(Some(&json!({"model": {"name": 7}}))), None);
        assert_eq!(model_identifier(Some(&json!("just a string"))), None);
    }

    #[test]
    fn test_experiment_identifier_found() {
        let lines = ["noise", "🔬 Experiment ID: 20251105_174807", "more"];
        assert_eq!(experiment_identifier(&lines).as_deref(), Some("20251105_174807"));
    }

    #[test]
    fn test_experiment_identifier_first_match_wins() {
        let lines = vec![
            "Experiment ID: 20240101_000000".to_string(),
            "Experiment ID: 20250101_120000".to_string(),
        ];
        assert_eq!(experiment_identifier(&lines).as_deref(), Some("20240101_000000"));
    }

    #[test]
    fn test_experiment_identifier_absent() {
        let lines = ["Experiment ID: pending", "Experiment 20251105_174807", "20251105_174807"];
        assert_eq!(experiment_identifier(&lines), None);
        assert_eq!(experiment_identifier(&["Experiment ID: 20251105_1748079"]), None);
        assert_eq!(experiment_identifier(&["Experiment ID: ٢٠٢٥١١٠٥_١٧٤٨٠٧"]), None);
        assert_eq!(experiment_identifier::<&str>(&[]), None);
    }
}
