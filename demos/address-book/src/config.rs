//! Demo configuration.

use std::path::Path;

use protolane::{PipelineConfig, ProtolaneError};
use serde::{Deserialize, Serialize};

/// Path of an optional JSON config file.
pub const CONFIG_ENV: &str = "PROTOLANE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Topic, group and codec settings.
    pub pipeline: PipelineConfig,

    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl DemoConfig {
    /// Reads `$PROTOLANE_CONFIG` if set, then applies the pipeline's
    /// environment overrides.
    pub fn load() -> Result<Self, ProtolaneError> {
        let config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        let pipeline = config.pipeline.with_env_overrides();
        pipeline.validate()?;
        Ok(Self { pipeline, ..config })
    }

    pub fn from_file(path: &Path) -> Result<Self, ProtolaneError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProtolaneError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtolaneError> {
        serde_json::from_str(json).map_err(|e| ProtolaneError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_config_default() {
        let config = DemoConfig::default();
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.pipeline.topic, "addressbook");
    }

    #[test]
    fn test_demo_config_from_json() {
        let config =
            DemoConfig::from_json(r#"{ "pipeline": { "topic": "people" }, "log_filter": "debug" }"#)
                .unwrap();
        assert_eq!(config.pipeline.topic, "people");
        assert_eq!(config.pipeline.group_id, "addressbook-group");
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let err = DemoConfig::from_file(Path::new("/nonexistent/protolane.json")).unwrap_err();
        assert!(matches!(err, ProtolaneError::Config(msg) if msg.contains("/nonexistent")));
    }
}
