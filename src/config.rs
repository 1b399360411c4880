//! Configuration Management
//!
//! Planner and executor settings, loadable from a JSON file and adjustable at
//! runtime with `SET`-style `key = value` assignments.

use crate::common::constants::DEFAULT_RELATION_PREFIX;
use crate::common::error::{FederationError, FederationResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Planner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Forward LIMIT to a fetch as a non-binding size hint when it is safe
    pub push_limit_hint: bool,
    /// Run independent steps concurrently
    pub parallel_execution: bool,
    /// Number of threads for parallel execution
    pub max_parallel_steps: usize,
    /// Prefix of step output relation names
    pub relation_prefix: String,
}

impl PlannerConfig {
    /// Setting names accepted by [`PlannerConfig::set`]
    pub const KEYS: [&'static str; 4] = [
        "push_limit_hint",
        "parallel_execution",
        "max_parallel_steps",
        "relation_prefix",
    ];

    /// Load a configuration from a JSON file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> FederationResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: PlannerConfig = serde_json::from_str(&text)
            .map_err(|e| FederationError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set a configuration variable
    pub fn set(&mut self, key: &str, value: &str) -> FederationResult<()> {
        let value = value.trim().trim_matches('\'');
        let mut updated = self.clone();
        match key.to_lowercase().as_str() {
            "push_limit_hint" => updated.push_limit_hint = parse_bool(key, value)?,
            "parallel_execution" => updated.parallel_execution = parse_bool(key, value)?,
            "max_parallel_steps" => {
                updated.max_parallel_steps = value.parse().map_err(|_| {
                    FederationError::Config(format!("{} expects a positive integer, got '{}'", key, value))
                })?
            }
            "relation_prefix" => updated.relation_prefix = value.to_string(),
            _ => {
                return Err(FederationError::Config(format!(
                    "unknown setting '{}' (expected one of: {})",
                    key,
                    Self::KEYS.join(", ")
                )))
            }
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Get a configuration variable as text
    pub fn get(&self, key: &str) -> Option<String> {
        match key.to_lowercase().as_str() {
            "push_limit_hint" => Some(self.push_limit_hint.to_string()),
            "parallel_execution" => Some(self.parallel_execution.to_string()),
            "max_parallel_steps" => Some(self.max_parallel_steps.to_string()),
            "relation_prefix" => Some(self.relation_prefix.clone()),
            _ => None,
        }
    }

    /// List all configuration variables
    pub fn list_all(&self) -> Vec<(String, String)> {
        Self::KEYS
            .iter()
            .filter_map(|k| self.get(k).map(|v| (k.to_string(), v)))
            .collect()
    }

    fn validate(&self) -> FederationResult<()> {
        if self.max_parallel_steps == 0 {
            return Err(FederationError::Config(
                "max_parallel_steps must be at least 1".to_string(),
            ));
        }
        let prefix_ok = !self.relation_prefix.is_empty()
            && self
                .relation_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !prefix_ok {
            return Err(FederationError::Config(format!(
                "relation_prefix must be a non-empty identifier, got '{}'",
                self.relation_prefix
            )));
        }
        Ok(())
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            push_limit_hint: true,
            parallel_execution: true,
            max_parallel_steps: num_cpus::get(),
            relation_prefix: DEFAULT_RELATION_PREFIX.to_string(),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> FederationResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        _ => Err(FederationError::Config(format!(
            "{} expects a boolean, got '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_set_and_get() {
        let mut config = PlannerConfig::default();
        config.set("PUSH_LIMIT_HINT", "off").unwrap();
        assert!(!config.push_limit_hint);
        config.set("max_parallel_steps", "2").unwrap();
        assert_eq!(config.get("max_parallel_steps").as_deref(), Some("2"));
        assert_eq!(config.list_all().len(), 4);
    }

    #[test]
    fn test_invalid_settings() {
        let mut config = PlannerConfig::default();
        assert!(matches!(config.set("bogus", "1"), Err(FederationError::Config(_))));
        assert!(matches!(config.set("parallel_execution", "maybe"), Err(FederationError::Config(_))));
        assert!(config.set("max_parallel_steps", "0").is_err());
        assert!(config.set("relation_prefix", "bad name").is_err());
        assert_eq!(config, PlannerConfig::default());
    }

    #[test]
    fn test_from_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"relation_prefix\": \"s\", \"push_limit_hint\": false}}").unwrap();
        let config = PlannerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.relation_prefix, "s");
        assert!(!config.push_limit_hint);
        assert!(config.parallel_execution);
    }
}
