//! Codec limits.

use serde::{Deserialize, Serialize};

/// Default ceiling for one encoded message: 64 MiB, as in upstream
/// protobuf libraries.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Default nesting depth for messages and groups.
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// Limits shared by the encoder and decoder.
///
/// Missing keys fall back to the defaults when deserialized, so a config
/// file only has to mention what it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Largest payload, in bytes, either side will handle.
    pub max_message_size: usize,

    /// Deepest message nesting the decoder will follow.
    pub recursion_limit: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_config_default() {
        let config = CodecConfig::default();
        assert_eq!(config.max_message_size, 64 * 1024 * 1024);
        assert_eq!(config.recursion_limit, 100);
    }

    #[test]
    fn test_codec_config_partial_json_uses_defaults() {
        let config: CodecConfig =
            serde_json::from_str(r#"{ "recursion_limit": 8 }"#).unwrap();
        assert_eq!(config.recursion_limit, 8);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }
}
