// Client configuration
// Loaded from config/sentinel.json when present, then overridden by environment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/sentinel.json";
pub const API_URL_ENV: &str = "SENTINEL_API_URL";
pub const EXAM_DURATION_ENV: &str = "SENTINEL_EXAM_DURATION_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the exam backend, without trailing slash.
    pub api_base: String,
    pub exam_duration_ms: u64,
    pub tick_ms: u64,
    /// Remaining time under which the countdown is shown as a warning.
    pub warning_threshold_ms: u64,
    /// Maximum number of questions drawn for a quiz.
    pub quiz_question_limit: usize,
    pub request_timeout_ms: u64,
    /// Loop iteration budget for submitted code. Unbounded when absent.
    pub loop_iteration_limit: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8082/api".to_string(),
            exam_duration_ms: 60 * 60 * 1000,
            tick_ms: 1000,
            warning_threshold_ms: 5 * 60 * 1000,
            quiz_question_limit: 15,
            request_timeout_ms: 30_000,
            loop_iteration_limit: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a JSON file. Missing keys take their defaults.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ClientConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from config/sentinel.json if it exists, otherwise use defaults,
    /// then apply environment overrides.
    pub fn load_default() -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        let config = if default_path.exists() {
            Self::load(default_path)?
        } else {
            Self::default()
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup(API_URL_ENV) {
            self.api_base = url;
        }
        if let Some(duration) = lookup(EXAM_DURATION_ENV) {
            self.exam_duration_ms = duration
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds", EXAM_DURATION_ENV))?;
        }
        self.api_base = self.api_base.trim_end_matches('/').to_string();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            anyhow::bail!("api_base cannot be empty");
        }
        if self.tick_ms == 0 {
            anyhow::bail!("tick_ms must be greater than zero");
        }
        if self.exam_duration_ms == 0 {
            anyhow::bail!("exam_duration_ms must be greater than zero");
        }
        if self.loop_iteration_limit == Some(0) {
            anyhow::bail!("loop_iteration_limit must be greater than zero when set");
        }
        Ok(())
    }

    pub fn exam_duration(&self) -> Duration {
        Duration::from_millis(self.exam_duration_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn warning_threshold(&self) -> Duration {
        Duration::from_millis(self.warning_threshold_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.exam_duration(), Duration::from_secs(3600));
        assert_eq!(config.tick(), Duration::from_secs(1));
        assert_eq!(config.quiz_question_limit, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"api_base": "http://exam.local/api"}"#).unwrap();
        assert_eq!(config.api_base, "http://exam.local/api");
        assert_eq!(config.tick_ms, 1000);
        assert_eq!(config.loop_iteration_limit, None);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (API_URL_ENV, "https://sentinel.example/api/"),
            (EXAM_DURATION_ENV, "90000"),
        ]);
        let config = ClientConfig::default()
            .with_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_base, "https://sentinel.example/api");
        assert_eq!(config.exam_duration_ms, 90_000);
    }

    #[test]
    fn test_invalid_duration_override() {
        let result = ClientConfig::default().with_env_overrides(|key| {
            (key == EXAM_DURATION_ENV).then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let config = ClientConfig {
            tick_ms: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
