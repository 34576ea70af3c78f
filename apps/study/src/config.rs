//! Service configuration loaded from the environment.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Settings for the LLM grading endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraderConfig {
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            api_key: String::new(),
            model: "deepseek-chat".to_string(),
            timeout_secs: 30,
        }
    }
}

impl GraderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Study service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Present the worst-recalled due items first.
    pub worst_first: bool,
    pub grader: GraderConfig,
}

impl StudyConfig {
    /// Load from process environment, reading a `.env` file first if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("RECALL_WORST_FIRST") {
            config.worst_first = parse_bool(&value)
                .with_context(|| format!("RECALL_WORST_FIRST has invalid value {value:?}"))?;
        }
        if let Some(url) = lookup("GRADER_BASE_URL") {
            config.grader.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = lookup("GRADER_API_KEY") {
            config.grader.api_key = key;
        }
        if let Some(model) = lookup("GRADER_MODEL") {
            config.grader.model = model;
        }
        if let Some(value) = lookup("GRADER_TIMEOUT_SECS") {
            config.grader.timeout_secs = value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("GRADER_TIMEOUT_SECS has invalid value {value:?}"))?;
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = StudyConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StudyConfig::default());
        assert!(!config.worst_first);
        assert_eq!(config.grader.model, "deepseek-chat");
        assert_eq!(config.grader.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn reads_all_keys() {
        let config = StudyConfig::from_lookup(lookup(&[
            ("RECALL_WORST_FIRST", "yes"),
            ("GRADER_BASE_URL", "http://localhost:8080/v1/"),
            ("GRADER_API_KEY", "secret"),
            ("GRADER_MODEL", "tiny"),
            ("GRADER_TIMEOUT_SECS", " 5 "),
        ]))
        .unwrap();

        assert!(config.worst_first);
        assert_eq!(config.grader.base_url, "http://localhost:8080/v1");
        assert_eq!(config.grader.api_key, "secret");
        assert_eq!(config.grader.model, "tiny");
        assert_eq!(config.grader.timeout_secs, 5);
    }

    #[test]
    fn rejects_bad_values() {
        let err = StudyConfig::from_lookup(lookup(&[("RECALL_WORST_FIRST", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("RECALL_WORST_FIRST"));

        let err = StudyConfig::from_lookup(lookup(&[("GRADER_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("GRADER_TIMEOUT_SECS"));
    }

    #[test]
    fn api_key_is_not_serialized() {
        let mut config = StudyConfig::default();
        config.grader.api_key = "secret".to_string();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
