//! Unified error type for Protolane.

use protolane_codec::{CodecError, DeserializationError, SchemaError, SerializationError};
use protolane_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `protolane` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate. The
/// codec's three error kinds stay separate variants so callers can still
/// tell a producer-side bug from a bad payload.
#[derive(Debug, thiserror::Error)]
pub enum ProtolaneError {
    /// A transport-level error (bus closed, duplicate subscription).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// A payload could not be decoded.
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    /// A schema definition or message builder call was invalid.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A record handler reported a failure.
    #[error("handler failed: {0}")]
    Handler(String),

    /// Configuration could not be loaded or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<CodecError> for ProtolaneError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Serialization(e) => Self::Serialization(e),
            CodecError::Deserialization(e) => Self::Deserialization(e),
            CodecError::Schema(e) => Self::Schema(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: ProtolaneError = TransportError::Closed.into();
        assert!(matches!(err, ProtolaneError::Transport(_)));
        assert_eq!(err.to_string(), "bus closed");
    }

    #[test]
    fn test_from_serialization_error() {
        let err: ProtolaneError = SerializationError::MissingMessage.into();
        assert!(matches!(err, ProtolaneError::Serialization(_)));
    }

    #[test]
    fn test_from_deserialization_error() {
        let err: ProtolaneError = DeserializationError::Truncated { offset: 3 }.into();
        assert!(matches!(err, ProtolaneError::Deserialization(_)));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_from_codec_error_keeps_kind() {
        let codec = CodecError::from(SchemaError::UnknownMessage("a.B".into()));
        let err: ProtolaneError = codec.into();
        assert!(matches!(err, ProtolaneError::Schema(SchemaError::UnknownMessage(_))));
    }
}
