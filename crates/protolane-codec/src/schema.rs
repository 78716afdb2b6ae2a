//! Message schemas: what fields a message has and how each is typed.
//!
//! Schemas are built once, validated once, and then shared read-only for
//! the rest of the process:
//!
//! ```text
//! MessageDescriptor ─┐
//! EnumDescriptor ────┼─→ DescriptorPoolBuilder::build() ─→ DescriptorPool
//!                    │                                          │
//!                    │                              pool.schema("pkg.Msg")
//!                    │                                          ▼
//!                    └──────────────────────────────────────→ Schema
//! ```
//!
//! A [`Schema`] is a cheap handle (an `Arc` plus an index) to one message
//! type inside a pool. Messages refer to other messages and enums by
//! fully-qualified name, so recursive types like a tree node holding child
//! nodes are fine; every name is resolved when the pool is built, never at
//! decode time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::wire::{MAX_FIELD_NUMBER, RESERVED_FIELD_NUMBERS, WireType};
use crate::{MessageBuilder, SchemaError};

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Bool,
    String,
    Bytes,
    /// An enum, by fully-qualified name.
    Enum(String),
    /// A nested message, by fully-qualified name.
    Message(String),
}

impl FieldType {
    /// The wire type a single (unpacked) value of this type uses.
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Int32
            | Self::Int64
            | Self::UInt32
            | Self::UInt64
            | Self::SInt32
            | Self::SInt64
            | Self::Bool
            | Self::Enum(_) => WireType::Varint,
            Self::Fixed64 | Self::SFixed64 | Self::Double => WireType::Fixed64,
            Self::Fixed32 | Self::SFixed32 | Self::Float => WireType::Fixed32,
            Self::String | Self::Bytes | Self::Message(_) => WireType::LengthDelimited,
        }
    }

    /// Scalar numeric types can be packed into one length-delimited run.
    pub fn is_packable(&self) -> bool {
        self.wire_type() != WireType::LengthDelimited
    }

    /// The referenced type name for enums and messages.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Enum(name) | Self::Message(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::SInt32 => "sint32",
            Self::SInt64 => "sint64",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::SFixed32 => "sfixed32",
            Self::SFixed64 => "sfixed64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Enum(name) => return write!(f, "enum {name}"),
            Self::Message(name) => return write!(f, "message {name}"),
        };
        f.write_str(name)
    }
}

/// How many values a field holds.
///
/// Every singular field tracks presence explicitly: `Optional` fields may
/// be set or unset, `Required` fields must be set for the message to
/// encode or decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Optional,
    Required,
    Repeated,
}

// ---------------------------------------------------------------------------
// FieldDescriptor
// ---------------------------------------------------------------------------

/// One field of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    number: u32,
    field_type: FieldType,
    cardinality: Cardinality,
    packed: bool,
    /// Index of the referenced message or enum in the pool, filled in by
    /// [`DescriptorPoolBuilder::build`].
    target: usize,
}

impl FieldDescriptor {
    fn new(
        name: impl Into<String>,
        number: u32,
        field_type: FieldType,
        cardinality: Cardinality,
    ) -> Self {
        let packed = cardinality == Cardinality::Repeated && field_type.is_packable();
        Self {
            name: name.into(),
            number,
            field_type,
            cardinality,
            packed,
            target: 0,
        }
    }

    pub fn optional(name: impl Into<String>, number: u32, field_type: FieldType) -> Self {
        Self::new(name, number, field_type, Cardinality::Optional)
    }

    pub fn required(name: impl Into<String>, number: u32, field_type: FieldType) -> Self {
        Self::new(name, number, field_type, Cardinality::Required)
    }

    /// A repeated field. Scalar numeric types are packed by default, as in
    /// proto3; use [`packed`](Self::packed) to override.
    pub fn repeated(name: impl Into<String>, number: u32, field_type: FieldType) -> Self {
        Self::new(name, number, field_type, Cardinality::Repeated)
    }

    pub fn packed(mut self, packed: bool) -> Self {
        self.packed = packed;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    pub fn is_required(&self) -> bool {
        self.cardinality == Cardinality::Required
    }

    pub fn is_packed(&self) -> bool {
        self.packed
    }
}

// ---------------------------------------------------------------------------
// MessageDescriptor / EnumDescriptor
// ---------------------------------------------------------------------------

/// A message type: a fully-qualified name and its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
    by_number: HashMap<u32, usize>,
    by_name: HashMap<String, usize>,
}

impl MessageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            by_number: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Adds a field. Validation happens when the pool is built.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }
}

/// One named value of an enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub number: i32,
}

/// An enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    name: String,
    values: Vec<EnumValue>,
}

impl EnumDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, name: impl Into<String>, number: i32) -> Self {
        self.values.push(EnumValue {
            name: name.into(),
            number,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|v| v.name == name).map(|v| v.number)
    }

    /// The first declared name for `number` (aliases share numbers).
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.number == number)
            .map(|v| v.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// DescriptorPool
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PoolInner {
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    message_index: HashMap<String, usize>,
    enum_index: HashMap<String, usize>,
}

/// A validated, immutable set of message and enum types.
///
/// Cloning is cheap; all clones share the same descriptors.
#[derive(Debug, Clone)]
pub struct DescriptorPool {
    inner: Arc<PoolInner>,
}

impl DescriptorPool {
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::default()
    }

    /// Returns the handle for one message type.
    ///
    /// # Errors
    /// [`SchemaError::UnknownMessage`] if the pool has no such message.
    pub fn schema(&self, name: &str) -> Result<Schema, SchemaError> {
        let index = *self
            .inner
            .message_index
            .get(name)
            .ok_or_else(|| SchemaError::UnknownMessage(name.to_string()))?;
        Ok(Schema {
            pool: self.clone(),
            index,
        })
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumDescriptor> {
        self.inner.enum_index.get(name).map(|&i| &self.inner.enums[i])
    }

    pub fn message_names(&self) -> impl Iterator<Item = &str> {
        self.inner.messages.iter().map(|m| m.name())
    }
}

/// Collects descriptors and validates them into a [`DescriptorPool`].
#[derive(Debug, Default)]
pub struct DescriptorPoolBuilder {
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
}

impl DescriptorPoolBuilder {
    pub fn message(mut self, message: MessageDescriptor) -> Self {
        self.messages.push(message);
        self
    }

    pub fn enumeration(mut self, enumeration: EnumDescriptor) -> Self {
        self.enums.push(enumeration);
        self
    }

    /// Validates every descriptor and resolves type references.
    ///
    /// # Errors
    /// The first [`SchemaError`] found: duplicate type names, bad or
    /// duplicate field numbers, duplicate field names, dangling type
    /// references, `packed` on a non-packable field, or empty enums.
    pub fn build(self) -> Result<DescriptorPool, SchemaError> {
        let Self { mut messages, enums } = self;

        let mut message_index = HashMap::new();
        let mut enum_index = HashMap::new();
        for (i, message) in messages.iter().enumerate() {
            if message_index.insert(message.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateType(message.name.clone()));
            }
        }
        for (i, enumeration) in enums.iter().enumerate() {
            if message_index.contains_key(&enumeration.name)
                || enum_index.insert(enumeration.name.clone(), i).is_some()
            {
                return Err(SchemaError::DuplicateType(enumeration.name.clone()));
            }
            validate_enum(enumeration)?;
        }

        for message in &mut messages {
            message.by_number.clear();
            message.by_name.clear();
            for (i, field) in message.fields.iter_mut().enumerate() {
                let number = field.number;
                if number == 0
                    || number > MAX_FIELD_NUMBER
                    || RESERVED_FIELD_NUMBERS.contains(&number)
                {
                    return Err(SchemaError::InvalidFieldNumber {
                        message: message.name.clone(),
                        number,
                    });
                }
                if message.by_number.insert(number, i).is_some() {
                    return Err(SchemaError::DuplicateFieldNumber {
                        message: message.name.clone(),
                        number,
                    });
                }
                if message.by_name.insert(field.name.clone(), i).is_some() {
                    return Err(SchemaError::DuplicateFieldName {
                        message: message.name.clone(),
                        field: field.name.clone(),
                    });
                }
                if field.packed
                    && !(field.cardinality == Cardinality::Repeated
                        && field.field_type.is_packable())
                {
                    return Err(SchemaError::InvalidPacked {
                        message: message.name.clone(),
                        field: field.name.clone(),
                    });
                }
                let resolved = match &field.field_type {
                    FieldType::Message(name) => message_index.get(name),
                    FieldType::Enum(name) => enum_index.get(name),
                    _ => Some(&0),
                };
                field.target = *resolved.ok_or_else(|| SchemaError::UnresolvedType {
                    message: message.name.clone(),
                    field: field.name.clone(),
                    type_name: field.field_type.type_name().unwrap_or_default().to_string(),
                })?;
            }
        }

        Ok(DescriptorPool {
            inner: Arc::new(PoolInner {
                messages,
                enums,
                message_index,
                enum_index,
            }),
        })
    }
}

fn validate_enum(enumeration: &EnumDescriptor) -> Result<(), SchemaError> {
    if enumeration.values.is_empty() {
        return Err(SchemaError::EmptyEnum(enumeration.name.clone()));
    }
    for (i, value) in enumeration.values.iter().enumerate() {
        if enumeration.values[..i].iter().any(|v| v.name == value.name) {
            return Err(SchemaError::DuplicateEnumValue {
                enum_name: enumeration.name.clone(),
                value: value.name.clone(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Handle to one message type inside a [`DescriptorPool`].
///
/// This is what a `Decoder` is bound to and what every `DynamicMessage`
/// carries. Two handles are equal when they point at the same type in the
/// same pool; loading the same definition into two pools yields two
/// distinct schemas.
#[derive(Clone)]
pub struct Schema {
    pool: DescriptorPool,
    index: usize,
}

impl Schema {
    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.pool.inner.messages[self.index]
    }

    /// Fully-qualified message name, e.g. `tutorial.AddressBook`.
    pub fn name(&self) -> &str {
        self.descriptor().name()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        self.descriptor().fields()
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.descriptor().field_by_name(name)
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.descriptor().field_by_number(number)
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Starts building a message of this type.
    pub fn new_message(&self) -> MessageBuilder {
        MessageBuilder::new(self.clone())
    }

    /// Schema of a message-typed field.
    pub fn message_schema(&self, field: &FieldDescriptor) -> Option<Schema> {
        match field.field_type {
            FieldType::Message(_) => Some(Schema {
                pool: self.pool.clone(),
                index: field.target,
            }),
            _ => None,
        }
    }

    /// Descriptor of an enum-typed field.
    pub fn enum_descriptor(&self, field: &FieldDescriptor) -> Option<&EnumDescriptor> {
        match field.field_type {
            FieldType::Enum(_) => Some(&self.pool.inner.enums[field.target]),
            _ => None,
        }
    }

    /// Schema of a message-typed field of this schema. The reference was
    /// resolved when the pool was built, so there is nothing to look up.
    pub(crate) fn target_schema(&self, field: &FieldDescriptor) -> Schema {
        Schema {
            pool: self.pool.clone(),
            index: field.target,
        }
    }

    /// Whether a message-typed `field` holds messages of `other`'s type.
    pub(crate) fn field_accepts(&self, field: &FieldDescriptor, other: &Schema) -> bool {
        matches!(field.field_type, FieldType::Message(_))
            && Arc::ptr_eq(&self.pool.inner, &other.pool.inner)
            && field.target == other.index
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pool.inner, &other.pool.inner) && self.index == other.index
    }
}

impl Eq for Schema {}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Schema").field(&self.name()).finish()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
