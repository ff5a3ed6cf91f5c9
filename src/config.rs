//! Orchestration configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is valid.
//! String values may reference environment variables as `${VAR}`.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

static ENV_VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"));

/// When the review cycle runs after execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewPolicy {
    /// Review every run
    Always,
    /// Review runs that look important (keywords, several workers, file deliverables)
    #[default]
    Auto,
    /// Never review
    Never,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TroupeConfig {
    /// Id of the orchestrator itself; never selected into a plan
    pub orchestrator_id: String,
    /// Worker that must be registered for reviews to run
    pub reviewer_id: String,
    /// Model the workers' output is assumed to come from
    pub primary_model: String,
    /// Review model for primary models missing from `model_pairs`
    pub fallback_review_model: String,
    /// Bidirectional alternate-model pairs used by the reviewer
    pub model_pairs: Vec<(String, String)>,
    pub review: ReviewPolicy,
    /// Request keywords that make `auto` review a run
    pub review_triggers: Vec<String>,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for TroupeConfig {
    fn default() -> Self {
        Self {
            orchestrator_id: "master-orchestrator".to_string(),
            reviewer_id: "reviewer".to_string(),
            primary_model: "claude-3-5-sonnet-20241022".to_string(),
            fallback_review_model: "claude-3-5-sonnet-20241022".to_string(),
            model_pairs: vec![
                (
                    "claude-3-5-sonnet-20241022".to_string(),
                    "gpt-4o".to_string(),
                ),
                (
                    "claude-3-5-haiku-20241022".to_string(),
                    "gpt-4o-mini".to_string(),
                ),
            ],
            review: ReviewPolicy::Auto,
            review_triggers: [
                "comprehensive",
                "detailed",
                "analysis",
                "report",
                "document",
                "research",
                "summary",
                "learning",
                "documentation",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            log_level: "info".to_string(),
        }
    }
}

impl TroupeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: TroupeConfig = toml::from_str(content)?;
        config.expand_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the crate relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator_id.trim().is_empty() {
            return Err(ConfigError::Invalid("orchestrator_id is empty".into()));
        }
        if self.reviewer_id.trim().is_empty() {
            return Err(ConfigError::Invalid("reviewer_id is empty".into()));
        }
        if self.reviewer_id == self.orchestrator_id {
            return Err(ConfigError::Invalid(
                "reviewer_id must differ from orchestrator_id".into(),
            ));
        }
        if let Some((a, _)) = self.model_pairs.iter().find(|(a, b)| a == b) {
            return Err(ConfigError::Invalid(format!(
                "model pair maps '{a}' to itself"
            )));
        }
        Ok(())
    }

    /// Alternate-model table with both directions of every pair
    pub fn alternate_models(&self) -> HashMap<String, String> {
        let mut table = HashMap::new();
        for (a, b) in &self.model_pairs {
            table.insert(a.clone(), b.clone());
            table.insert(b.clone(), a.clone());
        }
        table
    }

    fn expand_env_vars(&mut self) {
        for value in [
            &mut self.orchestrator_id,
            &mut self.reviewer_id,
            &mut self.primary_model,
            &mut self.fallback_review_model,
            &mut self.log_level,
        ] {
            *value = expand_string(value);
        }
        for (a, b) in &mut self.model_pairs {
            *a = expand_string(a);
            *b = expand_string(b);
        }
    }
}

/// Expand `${VAR}` references; unknown variables are left untouched
fn expand_string(s: &str) -> String {
    ENV_VAR
        .replace_all(s, |caps: &regex::Captures| {
            let name = &caps[1];
            std::env::var(name).unwrap_or_else(|_| format!("${{{name}}}"))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TroupeConfig::from_toml_str("").unwrap();
        assert_eq!(config, TroupeConfig::default());
        assert_eq!(config.review, ReviewPolicy::Auto);
    }

    #[test]
    fn test_alternate_table_is_bidirectional() {
        let table = TroupeConfig::default().alternate_models();
        assert_eq!(table["gpt-4o"], "claude-3-5-sonnet-20241022");
        assert_eq!(table["claude-3-5-sonnet-20241022"], "gpt-4o");
        assert_eq!(table["gpt-4o-mini"], "claude-3-5-haiku-20241022");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
orchestrator_id = "conductor"
review = "never"
model_pairs = [["model-x", "model-y"]]
"#
        )
        .unwrap();

        let config = TroupeConfig::load(file.path()).unwrap();
        assert_eq!(config.orchestrator_id, "conductor");
        assert_eq!(config.review, ReviewPolicy::Never);
        assert_eq!(config.alternate_models()["model-y"], "model-x");
        assert_eq!(config.reviewer_id, "reviewer");
    }

    #[test]
    fn test_env_expansion() {
        std::env::set_var("TROUPE_TEST_MODEL", "local-llama");
        let config =
            TroupeConfig::from_toml_str(r#"primary_model = "${TROUPE_TEST_MODEL}""#).unwrap();
        assert_eq!(config.primary_model, "local-llama");

        let config =
            TroupeConfig::from_toml_str(r#"primary_model = "${TROUPE_UNSET_VAR_XYZ}""#).unwrap();
        assert_eq!(config.primary_model, "${TROUPE_UNSET_VAR_XYZ}");
    }

    #[test]
    fn test_validation_errors() {
        let err = TroupeConfig::from_toml_str(r#"model_pairs = [["a", "a"]]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = TroupeConfig::from_toml_str(
            r#"orchestrator_id = "x"
reviewer_id = "x""#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("must differ"));

        let err = TroupeConfig::from_toml_str("review = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
