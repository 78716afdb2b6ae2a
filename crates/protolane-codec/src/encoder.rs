//! Structured message → wire bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::CodecConfig;
use crate::schema::{FieldDescriptor, FieldType};
use crate::value::{DynamicMessage, Value};
use crate::wire::{self, WireType};
use crate::{Schema, SerializationError};

/// Serializes [`DynamicMessage`]s into protobuf wire bytes.
///
/// The output is canonical: known fields in ascending field-number order,
/// repeated elements in insertion order, preserved unknown fields last in
/// the order they were received. Equal messages always produce identical
/// bytes.
///
/// An `Encoder` holds no per-call state, so one instance can be shared
/// across any number of threads.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    expected: Option<Schema>,
    config: CodecConfig,
}

impl Encoder {
    /// An encoder that accepts messages of any schema.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            expected: None,
            config,
        }
    }

    /// Restricts this encoder to messages of `schema`.
    pub fn bound_to(mut self, schema: Schema) -> Self {
        self.expected = Some(schema);
        self
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encodes `message`. `key` names the transport channel and is only
    /// used for diagnostics.
    ///
    /// # Errors
    /// - [`SerializationError::MissingMessage`] when `message` is `None`.
    /// - [`SerializationError::SchemaMismatch`] when bound to another schema.
    /// - [`SerializationError::MissingRequired`] when a required field is unset.
    /// - [`SerializationError::TooLarge`] when the output exceeds the limit.
    /// - [`SerializationError::RecursionLimit`] when messages nest deeper
    ///   than [`CodecConfig::recursion_limit`].
    pub fn encode(
        &self,
        key: &str,
        message: Option<&DynamicMessage>,
    ) -> Result<Bytes, SerializationError> {
        let Some(message) = message else {
            tracing::debug!(key, "refusing to encode a missing message");
            return Err(SerializationError::MissingMessage);
        };

        if let Some(expected) = &self.expected {
            if expected != message.schema() {
                return Err(SerializationError::SchemaMismatch {
                    expected: expected.name().to_string(),
                    actual: message.schema().name().to_string(),
                });
            }
        }

        check_tree(message, 0, self.config.recursion_limit)?;

        let size = encoded_len(message);
        if size > self.config.max_message_size {
            return Err(SerializationError::TooLarge {
                size,
                limit: self.config.max_message_size,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        write_message(message, &mut buf);
        debug_assert_eq!(buf.len(), size);

        tracing::trace!(
            key,
            schema = %message.schema(),
            len = buf.len(),
            "encoded message"
        );
        Ok(buf.freeze())
    }
}

/// Checks required fields at every depth, and that the nesting stays within
/// what the decoder accepts (the top-level message is depth 0).
fn check_tree(
    message: &DynamicMessage,
    depth: usize,
    limit: usize,
) -> Result<(), SerializationError> {
    if depth > limit {
        return Err(SerializationError::RecursionLimit { limit });
    }
    let schema = message.schema();
    for field in schema.fields() {
        if field.is_required() && !message.has(field.name()) {
            return Err(SerializationError::MissingRequired {
                message: schema.name().to_string(),
                field: field.name().to_string(),
            });
        }
    }
    for (_, value) in message.fields() {
        match value {
            Value::Message(nested) => check_tree(nested, depth + 1, limit)?,
            Value::List(items) => {
                for item in items {
                    if let Value::Message(nested) = item {
                        check_tree(nested, depth + 1, limit)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sizing
// ---------------------------------------------------------------------------

/// Exact number of bytes [`write_message`] produces.
pub(crate) fn encoded_len(message: &DynamicMessage) -> usize {
    let known: usize = message
        .fields()
        .map(|(field, value)| field_len(field, value))
        .sum();
    let unknown: usize = message.unknown_fields().iter().map(|u| u.raw().len()).sum();
    known + unknown
}

fn field_len(field: &FieldDescriptor, value: &Value) -> usize {
    let tag = wire::tag_len(field.number());
    match value {
        Value::List(items) if field.is_packed() => {
            let body = packed_body_len(field.field_type(), items);
            tag + wire::varint_len(body as u64) + body
        }
        Value::List(items) => items
            .iter()
            .map(|item| tag + payload_len(field.field_type(), item))
            .sum(),
        single => tag + payload_len(field.field_type(), single),
    }
}

fn packed_body_len(ty: &FieldType, items: &[Value]) -> usize {
    items.iter().map(|item| payload_len(ty, item)).sum()
}

/// Length of a value without its tag.
fn payload_len(ty: &FieldType, value: &Value) -> usize {
    match value {
        Value::Bool(_) => 1,
        Value::I32(v) => match ty {
            FieldType::SInt32 => wire::varint_len(u64::from(wire::zigzag_encode32(*v))),
            FieldType::SFixed32 => 4,
            _ => wire::varint_len(i64::from(*v) as u64),
        },
        Value::I64(v) => match ty {
            FieldType::SInt64 => wire::varint_len(wire::zigzag_encode64(*v)),
            FieldType::SFixed64 => 8,
            _ => wire::varint_len(*v as u64),
        },
        Value::U32(v) => match ty {
            FieldType::Fixed32 => 4,
            _ => wire::varint_len(u64::from(*v)),
        },
        Value::U64(v) => match ty {
            FieldType::Fixed64 => 8,
            _ => wire::varint_len(*v),
        },
        Value::F32(_) => 4,
        Value::F64(_) => 8,
        Value::Enum(v) => wire::varint_len(i64::from(*v) as u64),
        Value::String(s) => length_delimited_len(s.len()),
        Value::Bytes(b) => length_delimited_len(b.len()),
        Value::Message(m) => length_delimited_len(encoded_len(m)),
        // Lists never nest inside lists.
        Value::List(_) => 0,
    }
}

fn length_delimited_len(len: usize) -> usize {
    wire::varint_len(len as u64) + len
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

pub(crate) fn write_message(message: &DynamicMessage, buf: &mut impl BufMut) {
    for (field, value) in message.fields() {
        match value {
            Value::List(items) if field.is_packed() => {
                wire::encode_tag(field.number(), WireType::LengthDelimited, buf);
                let body = packed_body_len(field.field_type(), items);
                wire::encode_varint(body as u64, buf);
                for item in items {
                    write_payload(field.field_type(), item, buf);
                }
            }
            Value::List(items) => {
                for item in items {
                    write_field(field, item, buf);
                }
            }
            single => write_field(field, single, buf),
        }
    }
    for unknown in message.unknown_fields() {
        buf.put_slice(unknown.raw());
    }
}

fn write_field(field: &FieldDescriptor, value: &Value, buf: &mut impl BufMut) {
    wire::encode_tag(field.number(), field.field_type().wire_type(), buf);
    write_payload(field.field_type(), value, buf);
}

/// Writes a value without its tag. The field type picks between the
/// varint, zigzag and fixed-width encodings of the same Rust integer.
fn write_payload(ty: &FieldType, value: &Value, buf: &mut impl BufMut) {
    match value {
        Value::Bool(v) => wire::encode_varint(u64::from(*v), buf),
        Value::I32(v) => match ty {
            FieldType::SInt32 => wire::encode_varint(u64::from(wire::zigzag_encode32(*v)), buf),
            FieldType::SFixed32 => buf.put_i32_le(*v),
            // Negative int32 values are sign-extended to ten bytes.
            _ => wire::encode_varint(i64::from(*v) as u64, buf),
        },
        Value::I64(v) => match ty {
            FieldType::SInt64 => wire::encode_varint(wire::zigzag_encode64(*v), buf),
            FieldType::SFixed64 => buf.put_i64_le(*v),
            _ => wire::encode_varint(*v as u64, buf),
        },
        Value::U32(v) => match ty {
            FieldType::Fixed32 => buf.put_u32_le(*v),
            _ => wire::encode_varint(u64::from(*v), buf),
        },
        Value::U64(v) => match ty {
            FieldType::Fixed64 => buf.put_u64_le(*v),
            _ => wire::encode_varint(*v, buf),
        },
        Value::F32(v) => buf.put_f32_le(*v),
        Value::F64(v) => buf.put_f64_le(*v),
        Value::Enum(v) => wire::encode_varint(i64::from(*v) as u64, buf),
        Value::String(s) => {
            wire::encode_varint(s.len() as u64, buf);
            buf.put_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            wire::encode_varint(b.len() as u64, buf);
            buf.put_slice(b);
        }
        Value::Message(m) => {
            wire::encode_varint(encoded_len(m) as u64, buf);
            write_message(m, buf);
        }
        Value::List(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DescriptorPool, FieldDescriptor, MessageDescriptor};

    fn scalars_schema() -> Schema {
        DescriptorPool::builder()
            .message(
                MessageDescriptor::new("test.Scalars")
                    .field(FieldDescriptor::optional("a", 1, FieldType::Int32))
                    .field(FieldDescriptor::optional("b", 2, FieldType::String))
                    .field(FieldDescriptor::optional("s", 3, FieldType::SInt32))
                    .field(FieldDescriptor::repeated("packed", 4, FieldType::Int32))
                    .field(FieldDescriptor::optional("f", 5, FieldType::Fixed32))
                    .field(FieldDescriptor::required("r", 6, FieldType::Bool)),
            )
            .build()
            .unwrap()
            .schema("test.Scalars")
            .unwrap()
    }

    fn node_schema() -> Schema {
        DescriptorPool::builder()
            .message(MessageDescriptor::new("test.Node").field(FieldDescriptor::optional(
                "child",
                1,
                FieldType::Message("test.Node".into()),
            )))
            .build()
            .unwrap()
            .schema("test.Node")
            .unwrap()
    }

    /// A chain of `levels` nodes below the top-level one.
    fn nested(schema: &Schema, levels: usize) -> DynamicMessage {
        let mut message = schema.new_message().build();
        for _ in 0..levels {
            message = schema.new_message().set("child", message).unwrap().build();
        }
        message
    }

    fn encode(message: &DynamicMessage) -> Vec<u8> {
        Encoder::new().encode("test", Some(message)).unwrap().to_vec()
    }

    // =====================================================================
    // Known byte layouts
    // =====================================================================

    #[test]
    fn test_encode_matches_reference_bytes() {
        // The protobuf guide's classic example: field 1 = 150 → 08 96 01,
        // field 2 = "testing" → 12 07 74 65 73 74 69 6e 67.
        let msg = scalars_schema()
            .new_message()
            .set("r", true)
            .unwrap()
            .set("b", "testing")
            .unwrap()
            .set("a", 150i32)
            .unwrap()
            .build();
        let mut expected = vec![0x08, 0x96, 0x01, 0x12, 0x07];
        expected.extend_from_slice(b"testing");
        expected.extend_from_slice(&[0x30, 0x01]);
        assert_eq!(encode(&msg), expected);
    }

    #[test]
    fn test_encode_negative_int32_uses_ten_bytes() {
        let msg = scalars_schema()
            .new_message()
            .set("r", false)
            .unwrap()
            .set("a", -1i32)
            .unwrap()
            .build();
        let bytes = encode(&msg);
        // tag + 10 varint bytes + required bool (2 bytes)
        assert_eq!(bytes.len(), 1 + 10 + 2);
    }

    #[test]
    fn test_encode_sint32_uses_zigzag() {
        let msg = scalars_schema()
            .new_message()
            .set("r", false)
            .unwrap()
            .set("s", -1i32)
            .unwrap()
            .build();
        assert_eq!(encode(&msg), vec![0x18, 0x01, 0x30, 0x00]);
    }

    #[test]
    fn test_encode_packed_repeated() {
        // Guide example: packed [3i32, 270, 86942] on field 4.
        let msg = scalars_schema()
            .new_message()
            .set("r", false)
            .unwrap()
            .extend("packed", [3i32, 270, 86942])
            .unwrap()
            .build();
        assert_eq!(
            encode(&msg),
            vec![0x22, 0x06, 0x03, 0x8e, 0x02, 0x9e, 0xa7, 0x05, 0x30, 0x00]
        );
    }

    #[test]
    fn test_encode_fixed32_little_endian() {
        let msg = scalars_schema()
            .new_message()
            .set("r", false)
            .unwrap()
            .set("f", 1u32)
            .unwrap()
            .build();
        assert_eq!(encode(&msg), vec![0x2d, 0x01, 0x00, 0x00, 0x00, 0x30, 0x00]);
    }

    #[test]
    fn test_encoded_len_matches_output() {
        let msg = scalars_schema()
            .new_message()
            .set("r", true)
            .unwrap()
            .set("a", -5i32)
            .unwrap()
            .set("b", "x".repeat(300))
            .unwrap()
            .extend("packed", [1i32, -1, 1 << 20])
            .unwrap()
            .build();
        assert_eq!(encoded_len(&msg), encode(&msg).len());
    }

    // =====================================================================
    // Failures
    // =====================================================================

    #[test]
    fn test_encode_none_is_missing_message() {
        let err = Encoder::new().encode("test", None).unwrap_err();
        assert_eq!(err, SerializationError::MissingMessage);
    }

    #[test]
    fn test_encode_unset_required_field_fails() {
        let msg = scalars_schema().new_message().set("a", 1i32).unwrap().build();
        let err = Encoder::new().encode("test", Some(&msg)).unwrap_err();
        assert_eq!(
            err,
            SerializationError::MissingRequired {
                message: "test.Scalars".into(),
                field: "r".into(),
            }
        );
    }

    #[test]
    fn test_bound_encoder_rejects_other_schema() {
        let other = scalars_schema();
        let msg = scalars_schema().new_message().set("r", true).unwrap().build();
        let err = Encoder::new()
            .bound_to(other)
            .encode("test", Some(&msg))
            .unwrap_err();
        assert!(matches!(err, SerializationError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_encode_respects_size_limit() {
        let msg = scalars_schema()
            .new_message()
            .set("r", true)
            .unwrap()
            .set("b", "x".repeat(64))
            .unwrap()
            .build();
        let encoder = Encoder::with_config(CodecConfig {
            max_message_size: 16,
            ..CodecConfig::default()
        });
        let err = encoder.encode("test", Some(&msg)).unwrap_err();
        assert!(matches!(err, SerializationError::TooLarge { limit: 16, .. }));
    }

    #[test]
    fn test_encode_respects_recursion_limit() {
        let schema = node_schema();
        let config = CodecConfig {
            recursion_limit: 2,
            ..CodecConfig::default()
        };
        let err = Encoder::with_config(config)
            .encode("test", Some(&nested(&schema, 3)))
            .unwrap_err();
        assert_eq!(err, SerializationError::RecursionLimit { limit: 2 });

        let message = nested(&schema, 2);
        let bytes = Encoder::with_config(config)
            .encode("test", Some(&message))
            .unwrap();
        let decoded = crate::Decoder::with_config(schema, config)
            .decode("test", Some(&bytes))
            .unwrap();
        assert_eq!(decoded.into_message(), Some(message));
    }

    #[test]
    fn test_default_encoder_refuses_what_default_decoder_would_reject() {
        let message = nested(&node_schema(), 150);
        let err = Encoder::new().encode("test", Some(&message)).unwrap_err();
        assert_eq!(
            err,
            SerializationError::RecursionLimit {
                limit: crate::DEFAULT_RECURSION_LIMIT,
            }
        );
    }
}
