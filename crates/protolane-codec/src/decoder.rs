//! Wire bytes → structured message, validated against a bound schema.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use bytes::Bytes;

use crate::config::CodecConfig;
use crate::schema::{FieldDescriptor, FieldType};
use crate::value::{DynamicMessage, UnknownField, Value};
use crate::wire::{self, Reader, WireType};
use crate::{DeserializationError, Schema};

/// The result of a successful decode.
///
/// An empty payload is not an error: pub/sub systems use it as a tombstone
/// (for example, a deletion marker on a compacted topic), so it gets its
/// own outcome instead of being folded into "message" or "failure".
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T = DynamicMessage> {
    /// A fully-populated message.
    Message(T),
    /// The payload was absent or zero-length.
    Tombstone,
}

impl<T> Decoded<T> {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone)
    }

    pub fn message(&self) -> Option<&T> {
        match self {
            Self::Message(m) => Some(m),
            Self::Tombstone => None,
        }
    }

    pub fn into_message(self) -> Option<T> {
        match self {
            Self::Message(m) => Some(m),
            Self::Tombstone => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Self::Message(m) => Decoded::Message(f(m)),
            Self::Tombstone => Decoded::Tombstone,
        }
    }
}

/// Parses protobuf wire bytes into [`DynamicMessage`]s of one fixed schema.
///
/// The schema is bound at construction and never changes; nothing on the
/// wire can make the decoder switch to another type. Unknown field numbers
/// are skipped and preserved on the message, so a consumer running an
/// older schema can still forward newer messages without losing data.
///
/// Decoding is all-or-nothing: any malformed input produces a
/// [`DeserializationError`] and no partial message.
#[derive(Debug, Clone)]
pub struct Decoder {
    schema: Schema,
    config: CodecConfig,
}

impl Decoder {
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, CodecConfig::default())
    }

    pub fn with_config(schema: Schema, config: CodecConfig) -> Self {
        Self { schema, config }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Decodes `bytes`. `key` names the transport channel and is only used
    /// for diagnostics.
    ///
    /// `None` and empty input both decode to [`Decoded::Tombstone`].
    ///
    /// # Errors
    /// A [`DeserializationError`] describing the first problem found.
    pub fn decode(
        &self,
        key: &str,
        bytes: Option<&[u8]>,
    ) -> Result<Decoded, DeserializationError> {
        let bytes = match bytes {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                tracing::trace!(key, schema = %self.schema, "empty payload decoded as tombstone");
                return Ok(Decoded::Tombstone);
            }
        };

        if bytes.len() > self.config.max_message_size {
            return Err(DeserializationError::TooLarge {
                size: bytes.len(),
                limit: self.config.max_message_size,
            });
        }

        let result = decode_message(&self.schema, Reader::new(bytes), 0, &self.config)
            .and_then(|message| check_required(&message).map(|()| message));
        match result {
            Ok(message) => {
                tracing::trace!(key, schema = %self.schema, len = bytes.len(), "decoded message");
                Ok(Decoded::Message(message))
            }
            Err(error) => {
                tracing::debug!(
                    key,
                    schema = %self.schema,
                    len = bytes.len(),
                    %error,
                    "failed to decode message"
                );
                Err(error)
            }
        }
    }
}

fn decode_message(
    schema: &Schema,
    mut reader: Reader<'_>,
    depth: usize,
    config: &CodecConfig,
) -> Result<DynamicMessage, DeserializationError> {
    if depth > config.recursion_limit {
        return Err(DeserializationError::RecursionLimit {
            limit: config.recursion_limit,
        });
    }

    let mut fields = BTreeMap::new();
    let mut unknown = Vec::new();

    while !reader.is_empty() {
        let start = reader.position();
        let offset = reader.offset();
        let (number, wire_type) = reader.read_tag()?;

        if wire_type == WireType::EndGroup {
            return Err(DeserializationError::UnexpectedEndGroup { number, offset });
        }

        match schema.field_by_number(number) {
            Some(field) => {
                decode_field(schema, field, wire_type, &mut reader, &mut fields, depth, config)?
            }
            None => {
                reader.skip_field(number, wire_type, depth, config.recursion_limit)?;
                let raw = Bytes::copy_from_slice(reader.consumed_since(start));
                unknown.push(UnknownField::new(number, wire_type, raw));
            }
        }
    }

    Ok(DynamicMessage::from_parts(schema.clone(), fields, unknown))
}

/// Runs over the finished tree, after repeated occurrences of a singular
/// message have been merged, so a required field may arrive in any of them.
fn check_required(message: &DynamicMessage) -> Result<(), DeserializationError> {
    let schema = message.schema();
    for field in schema.fields() {
        if field.is_required() && !message.has(field.name()) {
            return Err(DeserializationError::MissingRequired {
                message: schema.name().to_string(),
                field: field.name().to_string(),
            });
        }
    }
    for (_, value) in message.fields() {
        match value {
            Value::Message(nested) => check_required(nested)?,
            Value::List(items) => items
                .iter()
                .filter_map(Value::as_message)
                .try_for_each(check_required)?,
            _ => {}
        }
    }
    Ok(())
}

fn decode_field(
    schema: &Schema,
    field: &FieldDescriptor,
    wire_type: WireType,
    reader: &mut Reader<'_>,
    fields: &mut BTreeMap<u32, Value>,
    depth: usize,
    config: &CodecConfig,
) -> Result<(), DeserializationError> {
    let ty = field.field_type();

    // Repeated scalars may arrive packed regardless of how the schema
    // declares them; parsers must accept both forms.
    if field.is_repeated() && ty.is_packable() && wire_type == WireType::LengthDelimited {
        let mut body = reader.read_length_delimited()?;
        let mut items = Vec::new();
        while !body.is_empty() {
            items.push(read_scalar(ty, &mut body)?);
        }
        if !items.is_empty() {
            append(fields, field.number(), items);
        }
        return Ok(());
    }

    if wire_type != ty.wire_type() {
        return Err(DeserializationError::WireTypeMismatch {
            field: field.name().to_string(),
            expected: ty.wire_type(),
            actual: wire_type,
        });
    }

    let value = match ty {
        FieldType::Message(_) => {
            let body = reader.read_length_delimited()?;
            let nested = schema.target_schema(field);
            Value::Message(decode_message(&nested, body, depth + 1, config)?)
        }
        FieldType::String => {
            let body = reader.read_length_delimited()?;
            let text = std::str::from_utf8(body.rest()).map_err(|_| {
                DeserializationError::InvalidUtf8 {
                    field: field.name().to_string(),
                }
            })?;
            Value::String(text.to_string())
        }
        FieldType::Bytes => {
            let body = reader.read_length_delimited()?;
            Value::Bytes(Bytes::copy_from_slice(body.rest()))
        }
        scalar => read_scalar(scalar, reader)?,
    };

    if field.is_repeated() {
        append(fields, field.number(), vec![value]);
        return Ok(());
    }

    match (fields.entry(field.number()), value) {
        // A singular message seen twice merges, as protobuf requires.
        (Entry::Occupied(mut slot), Value::Message(more)) => {
            if let Value::Message(existing) = slot.get_mut() {
                existing.merge_from(more);
            } else {
                slot.insert(Value::Message(more));
            }
        }
        // Last value wins for singular scalars.
        (Entry::Occupied(mut slot), value) => {
            slot.insert(value);
        }
        (Entry::Vacant(slot), value) => {
            slot.insert(value);
        }
    }
    Ok(())
}

fn append(fields: &mut BTreeMap<u32, Value>, number: u32, items: Vec<Value>) {
    match fields.entry(number).or_insert_with(|| Value::List(Vec::new())) {
        Value::List(existing) => existing.extend(items),
        other => *other = Value::List(items),
    }
}

/// Reads one varint or fixed-width value. Only called for scalar types.
fn read_scalar(ty: &FieldType, reader: &mut Reader<'_>) -> Result<Value, DeserializationError> {
    let value = match ty {
        // Truncating casts match protobuf: an int32 written as a 64-bit
        // varint keeps its low 32 bits.
        FieldType::Int32 => Value::I32(reader.read_varint()? as i32),
        FieldType::Int64 => Value::I64(reader.read_varint()? as i64),
        FieldType::UInt32 => Value::U32(reader.read_varint()? as u32),
        FieldType::UInt64 => Value::U64(reader.read_varint()?),
        FieldType::SInt32 => Value::I32(wire::zigzag_decode32(reader.read_varint()? as u32)),
        FieldType::SInt64 => Value::I64(wire::zigzag_decode64(reader.read_varint()?)),
        FieldType::Bool => Value::Bool(reader.read_varint()? != 0),
        FieldType::Enum(_) => Value::Enum(reader.read_varint()? as i32),
        FieldType::Fixed32 => Value::U32(reader.read_fixed32()?),
        FieldType::SFixed32 => Value::I32(reader.read_fixed32()? as i32),
        FieldType::Float => Value::F32(f32::from_bits(reader.read_fixed32()?)),
        FieldType::Fixed64 => Value::U64(reader.read_fixed64()?),
        FieldType::SFixed64 => Value::I64(reader.read_fixed64()? as i64),
        FieldType::Double => Value::F64(f64::from_bits(reader.read_fixed64()?)),
        FieldType::String | FieldType::Bytes | FieldType::Message(_) => {
            return Err(DeserializationError::WireTypeMismatch {
                field: ty.to_string(),
                expected: WireType::LengthDelimited,
                actual: ty.wire_type(),
            });
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DescriptorPool, FieldDescriptor, MessageDescriptor};

    fn schema() -> Schema {
        DescriptorPool::builder()
            .message(
                MessageDescriptor::new("test.Msg")
                    .field(FieldDescriptor::optional("id", 1, FieldType::Int32))
                    .field(FieldDescriptor::optional("name", 2, FieldType::String))
                    .field(FieldDescriptor::repeated("nums", 3, FieldType::Int32).packed(false))
                    .field(FieldDescriptor::optional(
                        "child",
                        4,
                        FieldType::Message("test.Msg".into()),
                    )),
            )
            .build()
            .unwrap()
            .schema("test.Msg")
            .unwrap()
    }

    fn decode(bytes: &[u8]) -> Result<Decoded, DeserializationError> {
        Decoder::new(schema()).decode("test", Some(bytes))
    }

    // =====================================================================
    // Tombstones
    // =====================================================================

    #[test]
    fn test_empty_and_missing_payloads_are_tombstones() {
        let decoder = Decoder::new(schema());
        assert!(decoder.decode("test", Some(&[])).unwrap().is_tombstone());
        assert!(decoder.decode("test", None).unwrap().is_tombstone());
    }

    #[test]
    fn test_decoded_helpers() {
        let decoded: Decoded<u8> = Decoded::Message(3);
        assert_eq!(decoded.message(), Some(&3));
        assert_eq!(decoded.clone().map(|v| v * 2), Decoded::Message(6));
        assert_eq!(decoded.into_message(), Some(3));
        assert_eq!(Decoded::<u8>::Tombstone.into_message(), None);
    }

    // =====================================================================
    // Wire-level behavior
    // =====================================================================

    #[test]
    fn test_decode_reference_bytes() {
        let decoded = decode(&[0x08, 0x96, 0x01]).unwrap().into_message().unwrap();
        assert_eq!(decoded.get("id"), Some(&Value::I32(150)));
        assert!(!decoded.has("name"));
    }

    #[test]
    fn test_packed_and_unpacked_both_accepted() {
        // Declared unpacked, but sent packed [1, 2], then one unpacked 3.
        let decoded = decode(&[0x1a, 0x02, 0x01, 0x02, 0x18, 0x03])
            .unwrap()
            .into_message()
            .unwrap();
        assert_eq!(
            decoded.repeated("nums"),
            &[Value::I32(1), Value::I32(2), Value::I32(3)]
        );
    }

    #[test]
    fn test_empty_packed_run_leaves_field_unset() {
        let decoded = decode(&[0x1a, 0x00]).unwrap().into_message().unwrap();
        assert!(!decoded.has("nums"));
    }

    #[test]
    fn test_last_scalar_wins() {
        let decoded = decode(&[0x08, 0x01, 0x08, 0x02]).unwrap().into_message().unwrap();
        assert_eq!(decoded.get("id"), Some(&Value::I32(2)));
    }

    #[test]
    fn test_repeated_singular_message_merges() {
        // child { id: 1 } then child { name: "x" } → child { id: 1 name: "x" }
        let bytes = [0x22, 0x02, 0x08, 0x01, 0x22, 0x03, 0x12, 0x01, b'x'];
        let decoded = decode(&bytes).unwrap().into_message().unwrap();
        let child = decoded.get_message("child").unwrap();
        assert_eq!(child.get("id"), Some(&Value::I32(1)));
        assert_eq!(child.get_str("name"), Some("x"));
    }

    #[test]
    fn test_unknown_field_preserved() {
        // Field 9 varint 5 is not in the schema.
        let decoded = decode(&[0x48, 0x05, 0x08, 0x01]).unwrap().into_message().unwrap();
        let unknown = decoded.unknown_fields();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].number(), 9);
        assert_eq!(unknown[0].wire_type(), WireType::Varint);
        assert_eq!(unknown[0].raw().as_ref(), &[0x48, 0x05]);
    }

    // =====================================================================
    // Malformed input
    // =====================================================================

    #[test]
    fn test_wire_type_mismatch() {
        // id (varint) sent as length-delimited.
        let err = decode(&[0x0a, 0x01, 0x00]).unwrap_err();
        assert_eq!(
            err,
            DeserializationError::WireTypeMismatch {
                field: "id".into(),
                expected: WireType::Varint,
                actual: WireType::LengthDelimited,
            }
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let err = decode(&[0x12, 0x02, 0xff, 0xfe]).unwrap_err();
        assert_eq!(err, DeserializationError::InvalidUtf8 { field: "name".into() });
    }

    #[test]
    fn test_length_past_end() {
        let err = decode(&[0x12, 0x05, b'a']).unwrap_err();
        assert!(matches!(err, DeserializationError::LengthOverflow { length: 5, .. }));
    }

    #[test]
    fn test_stray_end_group() {
        let err = decode(&[0x0c]).unwrap_err();
        assert!(matches!(err, DeserializationError::UnexpectedEndGroup { number: 1, .. }));
    }

    #[test]
    fn test_error_offsets_are_absolute_inside_nested_messages() {
        // child { <truncated varint> }
        let err = decode(&[0x08, 0x01, 0x22, 0x02, 0x08, 0x80]).unwrap_err();
        assert_eq!(err, DeserializationError::Truncated { offset: 5 });
    }

    #[test]
    fn test_recursion_limit() {
        // Nest `child` three levels deep and allow only two.
        let bytes = [0x22, 0x04, 0x22, 0x02, 0x22, 0x00];
        let decoder = Decoder::with_config(
            schema(),
            CodecConfig {
                recursion_limit: 2,
                ..CodecConfig::default()
            },
        );
        let err = decoder.decode("test", Some(&bytes)).unwrap_err();
        assert_eq!(err, DeserializationError::RecursionLimit { limit: 2 });

        let decoder = Decoder::with_config(
            schema(),
            CodecConfig {
                recursion_limit: 3,
                ..CodecConfig::default()
            },
        );
        assert!(decoder.decode("test", Some(&bytes)).is_ok());
    }

    #[test]
    fn test_input_size_limit() {
        let decoder = Decoder::with_config(
            schema(),
            CodecConfig {
                max_message_size: 2,
                ..CodecConfig::default()
            },
        );
        let err = decoder.decode("test", Some(&[0x08, 0x96, 0x01])).unwrap_err();
        assert_eq!(err, DeserializationError::TooLarge { size: 3, limit: 2 });
    }

    // =====================================================================
    // Required fields
    // =====================================================================

    fn wrapper_schema() -> Schema {
        DescriptorPool::builder()
            .message(
                MessageDescriptor::new("test.Pair")
                    .field(FieldDescriptor::required("a", 1, FieldType::Int32))
                    .field(FieldDescriptor::required("b", 2, FieldType::Int32)),
            )
            .message(MessageDescriptor::new("test.Wrapper").field(FieldDescriptor::optional(
                "pair",
                1,
                FieldType::Message("test.Pair".into()),
            )))
            .build()
            .unwrap()
            .schema("test.Wrapper")
            .unwrap()
    }

    #[test]
    fn test_required_fields_may_be_split_across_occurrences() {
        // pair { a: 1 } followed by pair { b: 2 }.
        let bytes = [0x0a, 0x02, 0x08, 0x01, 0x0a, 0x02, 0x10, 0x02];
        let decoded = Decoder::new(wrapper_schema())
            .decode("test", Some(&bytes))
            .unwrap()
            .into_message()
            .unwrap();
        let pair = decoded.get_message("pair").unwrap();
        assert_eq!(pair.get("a").and_then(Value::as_i32), Some(1));
        assert_eq!(pair.get("b").and_then(Value::as_i32), Some(2));
    }

    #[test]
    fn test_missing_nested_required_field() {
        let bytes = [0x0a, 0x02, 0x08, 0x01];
        let err = Decoder::new(wrapper_schema())
            .decode("test", Some(&bytes))
            .unwrap_err();
        assert_eq!(
            err,
            DeserializationError::MissingRequired {
                message: "test.Pair".into(),
                field: "b".into(),
            }
        );
    }

    // =====================================================================
    // Unknown-only messages
    // =====================================================================

    #[test]
    fn test_message_with_only_unknown_fields_is_not_empty() {
        // Field 9 is not in the schema.
        let message = decode(&[0x48, 0x01]).unwrap().into_message().unwrap();
        assert_eq!(message.unknown_fields().len(), 1);
        assert_eq!(message.len(), 1);
        assert!(!message.is_empty());
    }
}
