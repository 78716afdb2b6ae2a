//! Pipeline configuration.

use protolane_codec::CodecConfig;
use serde::{Deserialize, Serialize};

use crate::ProtolaneError;

/// Environment variable that overrides [`PipelineConfig::topic`].
pub const TOPIC_ENV: &str = "PROTOLANE_TOPIC";

/// Environment variable that overrides [`PipelineConfig::group_id`].
pub const GROUP_ENV: &str = "PROTOLANE_GROUP";

/// What a consumer pipeline does with a payload it cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log the error and move on to the next record.
    #[default]
    Skip,
    /// Stop the pipeline and return the error.
    Halt,
}

/// Settings shared by the producing and consuming side of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Topic records are published to and read from.
    pub topic: String,

    /// Consumer group name.
    pub group_id: String,

    /// Per-group queue depth on the bus.
    pub channel_capacity: usize,

    /// Policy for undecodable payloads.
    pub on_decode_error: ErrorPolicy,

    /// Limits for the encoder and decoder.
    pub codec: CodecConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic: "addressbook".to_string(),
            group_id: "addressbook-group".to_string(),
            channel_capacity: 64,
            on_decode_error: ErrorPolicy::Skip,
            codec: CodecConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses a JSON config; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ProtolaneError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ProtolaneError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `PROTOLANE_TOPIC` and `PROTOLANE_GROUP` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary lookup. Empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(topic) = lookup(TOPIC_ENV).filter(|v| !v.is_empty()) {
            self.topic = topic;
        }
        if let Some(group) = lookup(GROUP_ENV).filter(|v| !v.is_empty()) {
            self.group_id = group;
        }
        self
    }

    /// Checks that the names are non-empty and the queue can hold a record.
    pub fn validate(&self) -> Result<(), ProtolaneError> {
        if self.topic.is_empty() {
            return Err(ProtolaneError::Config("topic must not be empty".into()));
        }
        if self.group_id.is_empty() {
            return Err(ProtolaneError::Config("group_id must not be empty".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ProtolaneError::Config(
                "channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
