//! Error types for the codec layer.
//!
//! Encoding and decoding failures are deliberately separate types. A
//! [`SerializationError`] means the caller handed us a bad message (a bug on
//! the producing side). A [`DeserializationError`] means the bytes that came
//! off the wire do not match the schema the decoder was bound to, either
//! because they were corrupted in transit or because producer and consumer
//! disagree about the schema version. Consumers usually want different
//! policies for the two, so they must never be folded together silently.

use crate::wire::WireType;

/// The in-memory message could not be turned into bytes.
///
/// Always a programming error on the producer side; retrying will not help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializationError {
    /// No message was supplied.
    #[error("no message to serialize")]
    MissingMessage,

    /// The encoder is bound to one schema and the message uses another.
    #[error("schema mismatch: encoder expects `{expected}`, message is `{actual}`")]
    SchemaMismatch { expected: String, actual: String },

    /// A `required` field is unset somewhere in the message tree.
    #[error("required field `{field}` of `{message}` is not set")]
    MissingRequired { message: String, field: String },

    /// The encoded form would exceed the configured size limit.
    #[error("encoded message is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    /// Messages nest deeper than a decoder with the same config accepts.
    #[error("message nesting exceeds the recursion limit of {limit}")]
    RecursionLimit { limit: usize },
}

/// The byte sequence does not conform to the bound schema's wire grammar.
///
/// Offsets are absolute positions in the top-level input buffer, so they
/// stay meaningful when the failure happens inside a nested message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeserializationError {
    /// The buffer ended in the middle of a tag, varint, fixed-width value
    /// or length-delimited body.
    #[error("input truncated at byte {offset}")]
    Truncated { offset: usize },

    /// A varint ran past the 10-byte maximum.
    #[error("varint at byte {offset} is longer than 10 bytes")]
    VarintOverflow { offset: usize },

    /// Field number 0, or one above 2^29 - 1.
    #[error("invalid field number {number} at byte {offset}")]
    InvalidFieldNumber { number: u64, offset: usize },

    /// Wire types 6 and 7 do not exist.
    #[error("invalid wire type {wire_type} at byte {offset}")]
    InvalidWireType { wire_type: u8, offset: usize },

    /// A field the schema knows arrived with an incompatible wire type.
    #[error("field `{field}` expects wire type {expected}, got {actual}")]
    WireTypeMismatch {
        field: String,
        expected: WireType,
        actual: WireType,
    },

    /// A length prefix points past the end of the buffer.
    #[error("length {length} at byte {offset} exceeds the {remaining} bytes remaining")]
    LengthOverflow {
        length: u64,
        remaining: usize,
        offset: usize,
    },

    /// A `string` field holds bytes that are not UTF-8.
    #[error("field `{field}` is not valid UTF-8")]
    InvalidUtf8 { field: String },

    /// An end-group marker with no matching start-group.
    #[error("unexpected end-group marker for field {number} at byte {offset}")]
    UnexpectedEndGroup { number: u32, offset: usize },

    /// A start-group marker that is never closed.
    #[error("group for field {number} is never closed")]
    UnterminatedGroup { number: u32 },

    /// Nesting went deeper than the configured limit.
    #[error("message nesting exceeds the limit of {limit}")]
    RecursionLimit { limit: usize },

    /// A `required` field never appeared in the input.
    #[error("required field `{field}` of `{message}` is missing")]
    MissingRequired { message: String, field: String },

    /// The input is larger than the configured size limit.
    #[error("input is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// A schema definition is invalid, or a message builder was misused.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Two messages or enums share a fully-qualified name.
    #[error("type `{0}` is defined more than once")]
    DuplicateType(String),

    /// Two fields of one message share a number.
    #[error("field number {number} is used twice in `{message}`")]
    DuplicateFieldNumber { message: String, number: u32 },

    /// Two fields of one message share a name.
    #[error("field `{field}` is declared twice in `{message}`")]
    DuplicateFieldName { message: String, field: String },

    /// Field number outside `1..=536870911`, or inside the reserved
    /// `19000..=19999` range.
    #[error("field number {number} in `{message}` is out of range or reserved")]
    InvalidFieldNumber { message: String, number: u32 },

    /// A field references a message or enum that is not in the pool.
    #[error("field `{field}` of `{message}` references unknown type `{type_name}`")]
    UnresolvedType {
        message: String,
        field: String,
        type_name: String,
    },

    /// `packed` on a field that is not a repeated scalar number.
    #[error("field `{field}` of `{message}` cannot be packed")]
    InvalidPacked { message: String, field: String },

    /// An enum with no values.
    #[error("enum `{0}` has no values")]
    EmptyEnum(String),

    /// Two values of one enum share a name.
    #[error("enum `{enum_name}` declares `{value}` twice")]
    DuplicateEnumValue { enum_name: String, value: String },

    /// No message with this name exists in the pool.
    #[error("unknown message type `{0}`")]
    UnknownMessage(String),

    /// The message has no field with this name.
    #[error("`{message}` has no field named `{field}`")]
    UnknownField { message: String, field: String },

    /// The value does not fit the field's declared type.
    #[error("field `{field}` of `{message}` expects {expected}")]
    TypeMismatch {
        message: String,
        field: String,
        expected: String,
    },

    /// `set` on a repeated field with a single value, or `push` on a
    /// singular field.
    #[error("field `{field}` of `{message}` is {cardinality}")]
    CardinalityMismatch {
        message: String,
        field: String,
        cardinality: &'static str,
    },

    /// The enum does not declare this number or name.
    #[error("enum `{enum_name}` has no value `{value}`")]
    UnknownEnumValue { enum_name: String, value: String },

    /// A JSON schema definition is structurally incomplete.
    #[error("invalid schema definition: {0}")]
    InvalidDefinition(String),

    /// A JSON schema definition could not be parsed.
    #[cfg(feature = "json")]
    #[error("failed to parse schema definition: {0}")]
    Json(#[from] serde_json::Error),
}

/// Any codec failure, for callers that do not need to tell them apart.
///
/// The `#[from]` attributes let `?` lift each specific error into this one.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
