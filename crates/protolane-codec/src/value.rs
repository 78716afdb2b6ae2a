//! Dynamic, schema-checked message values.
//!
//! A [`DynamicMessage`] is an immutable tree of [`Value`]s tied to one
//! [`Schema`]. The only ways to get one are [`MessageBuilder::build`]
//! (which type-checks every value as it is set) and the decoder (which only
//! produces values of the declared types), so the encoder never has to
//! second-guess a value's shape.
//!
//! Presence is explicit. A singular field is either in the message or not;
//! setting a field to `0` or `""` is different from leaving it unset, and
//! that difference survives a round trip through the wire format.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::schema::{FieldDescriptor, FieldType, Schema};
use crate::wire::WireType;
use crate::SchemaError;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single field value.
///
/// The variant follows the Rust representation, not the wire encoding:
/// `int32`, `sint32` and `sfixed32` fields all hold [`Value::I32`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Bytes),
    /// An enum value by number. Decoded messages may carry numbers the
    /// schema does not declare (enums are open).
    Enum(i32),
    Message(DynamicMessage),
    /// The elements of a repeated field.
    List(Vec<Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<i32> {
        match self {
            Self::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Self::Message(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    &str => String,
    Bytes => Bytes,
    Vec<u8> => Bytes,
    DynamicMessage => Message,
}

// ---------------------------------------------------------------------------
// Unknown fields
// ---------------------------------------------------------------------------

/// A field the decoder's schema does not know, kept verbatim.
///
/// `raw` holds the tag and value exactly as received, so re-encoding the
/// message reproduces them byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    number: u32,
    wire_type: WireType,
    raw: Bytes,
}

impl UnknownField {
    pub(crate) fn new(number: u32, wire_type: WireType, raw: Bytes) -> Self {
        Self {
            number,
            wire_type,
            raw,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    /// Tag plus value, as they appeared on the wire.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

// ---------------------------------------------------------------------------
// DynamicMessage
// ---------------------------------------------------------------------------

/// An immutable message conforming to one [`Schema`].
///
/// Known fields are keyed by field number, so two messages compare equal
/// regardless of the order their fields were set in.
#[derive(Clone, PartialEq)]
pub struct DynamicMessage {
    schema: Schema,
    fields: BTreeMap<u32, Value>,
    unknown: Vec<UnknownField>,
}

impl DynamicMessage {
    pub(crate) fn from_parts(
        schema: Schema,
        fields: BTreeMap<u32, Value>,
        unknown: Vec<UnknownField>,
    ) -> Self {
        Self {
            schema,
            fields,
            unknown,
        }
    }

    /// A message of `schema` with no fields set.
    pub fn empty(schema: Schema) -> Self {
        Self::from_parts(schema, BTreeMap::new(), Vec::new())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The value of a field, or `None` if it is unset.
    ///
    /// Repeated fields come back as [`Value::List`].
    pub fn get(&self, name: &str) -> Option<&Value> {
        let field = self.schema.field_by_name(name)?;
        self.fields.get(&field.number())
    }

    pub fn get_by_number(&self, number: u32) -> Option<&Value> {
        self.fields.get(&number)
    }

    /// Whether the field is set. Repeated fields count as set when they
    /// hold at least one element.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Elements of a repeated field; empty when unset.
    pub fn repeated(&self, name: &str) -> &[Value] {
        self.get(name).and_then(Value::as_list).unwrap_or(&[])
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_message(&self, name: &str) -> Option<&DynamicMessage> {
        self.get(name).and_then(Value::as_message)
    }

    /// Symbolic name of an enum field's value, when the schema declares it.
    pub fn get_enum_name(&self, name: &str) -> Option<&str> {
        let field = self.schema.field_by_name(name)?;
        let number = self.fields.get(&field.number())?.as_enum()?;
        self.schema.enum_descriptor(field)?.name_of(number)
    }

    /// Set fields with their descriptors, in ascending field-number order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldDescriptor, &Value)> {
        self.fields.iter().filter_map(|(number, value)| {
            self.schema.field_by_number(*number).map(|field| (field, value))
        })
    }

    pub fn unknown_fields(&self) -> &[UnknownField] {
        &self.unknown
    }

    /// Number of set known fields plus preserved unknown fields.
    pub fn len(&self) -> usize {
        self.fields.len() + self.unknown.len()
    }

    /// No known fields set and no unknown fields preserved.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.unknown.is_empty()
    }

    /// Merges `other` into `self` with protobuf semantics: singular scalars
    /// are overwritten, singular messages merge recursively, repeated
    /// fields and unknown fields are appended.
    pub(crate) fn merge_from(&mut self, other: DynamicMessage) {
        for (number, value) in other.fields {
            match (self.fields.get_mut(&number), value) {
                (Some(Value::List(existing)), Value::List(more)) => existing.extend(more),
                (Some(Value::Message(existing)), Value::Message(more)) => {
                    existing.merge_from(more)
                }
                (_, value) => {
                    self.fields.insert(number, value);
                }
            }
        }
        self.unknown.extend(other.unknown);
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DynamicMessage");
        s.field("schema", &self.schema.name());
        for (field, value) in self.fields() {
            s.field(field.name(), value);
        }
        if !self.unknown.is_empty() {
            s.field("unknown", &self.unknown);
        }
        s.finish()
    }
}

/// Renders a single-line, protobuf text-format style view for logs:
///
/// ```text
/// people { name: "Jhon" phones { number: "0123235235" type: PHONE_TYPE_MOBILE } }
/// ```
///
/// Unknown fields are not shown.
impl fmt::Display for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, value) in self.fields() {
            let items = match value {
                Value::List(items) => items.as_slice(),
                single => std::slice::from_ref(single),
            };
            for item in items {
                if !first {
                    f.write_str(" ")?;
                }
                first = false;
                match item {
                    Value::Message(nested) if nested.fields.is_empty() => {
                        write!(f, "{} {{}}", field.name())?
                    }
                    Value::Message(nested) => write!(f, "{} {{ {nested} }}", field.name())?,
                    Value::Enum(number) => {
                        let name = self.schema.enum_descriptor(field).and_then(|e| e.name_of(*number));
                        match name {
                            Some(name) => write!(f, "{}: {name}", field.name())?,
                            None => write!(f, "{}: {number}", field.name())?,
                        }
                    }
                    other => {
                        write!(f, "{}: ", field.name())?;
                        write_scalar(f, other)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn write_scalar(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Bool(v) => write!(f, "{v}"),
        Value::I32(v) => write!(f, "{v}"),
        Value::I64(v) => write!(f, "{v}"),
        Value::U32(v) => write!(f, "{v}"),
        Value::U64(v) => write!(f, "{v}"),
        Value::F32(v) => write!(f, "{v}"),
        Value::F64(v) => write!(f, "{v}"),
        Value::String(v) => write!(f, "{v:?}"),
        Value::Bytes(v) => write!(f, "\"{}\"", v.escape_ascii()),
        Value::Enum(v) => write!(f, "{v}"),
        Value::Message(v) => write!(f, "{{ {v} }}"),
        Value::List(_) => f.write_str("[..]"),
    }
}

// ---------------------------------------------------------------------------
// MessageBuilder
// ---------------------------------------------------------------------------

/// Builds a [`DynamicMessage`], checking each value against the schema.
///
/// Every setter consumes and returns the builder so calls chain with `?`:
///
/// ```rust
/// use protolane_codec::{DescriptorPool, FieldDescriptor, FieldType, MessageDescriptor};
///
/// let pool = DescriptorPool::builder()
///     .message(
///         MessageDescriptor::new("demo.Greeting")
///             .field(FieldDescriptor::optional("text", 1, FieldType::String))
///             .field(FieldDescriptor::repeated("lucky", 2, FieldType::Int32)),
///     )
///     .build()?;
/// let schema = pool.schema("demo.Greeting")?;
///
/// let msg = schema
///     .new_message()
///     .set("text", "hello")?
///     .push("lucky", 7i32)?
///     .push("lucky", 13i32)?
///     .build();
/// assert_eq!(msg.get_str("text"), Some("hello"));
/// assert_eq!(msg.repeated("lucky").len(), 2);
/// # Ok::<(), protolane_codec::SchemaError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    schema: Schema,
    fields: BTreeMap<u32, Value>,
}

impl MessageBuilder {
    pub(crate) fn new(schema: Schema) -> Self {
        Self {
            schema,
            fields: BTreeMap::new(),
        }
    }

    /// Sets a singular field, or replaces a repeated field with a
    /// [`Value::List`].
    ///
    /// # Errors
    /// [`SchemaError::UnknownField`], [`SchemaError::TypeMismatch`],
    /// [`SchemaError::CardinalityMismatch`] or
    /// [`SchemaError::UnknownEnumValue`].
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Result<Self, SchemaError> {
        let schema = self.schema.clone();
        let field = lookup(&schema, name)?;
        let value = value.into();
        if field.is_repeated() {
            let Value::List(items) = value else {
                return Err(self.cardinality_error(field, "repeated; use push or a list"));
            };
            for item in &items {
                self.check(field, item)?;
            }
            let number = field.number();
            if items.is_empty() {
                self.fields.remove(&number);
            } else {
                self.fields.insert(number, Value::List(items));
            }
        } else {
            self.check(field, &value)?;
            let number = field.number();
            self.fields.insert(number, value);
        }
        Ok(self)
    }

    /// Sets an enum field by its symbolic value name.
    pub fn set_enum(self, name: &str, value: &str) -> Result<Self, SchemaError> {
        let number = self.enum_number(name, value)?;
        self.set(name, Value::Enum(number))
    }

    /// Appends one element to a repeated field.
    pub fn push(mut self, name: &str, value: impl Into<Value>) -> Result<Self, SchemaError> {
        let schema = self.schema.clone();
        let field = lookup(&schema, name)?;
        if !field.is_repeated() {
            return Err(self.cardinality_error(field, "singular; use set"));
        }
        let value = value.into();
        self.check(field, &value)?;
        let number = field.number();
        match self
            .fields
            .entry(number)
            .or_insert_with(|| Value::List(Vec::new()))
        {
            Value::List(items) => items.push(value),
            other => *other = Value::List(vec![value]),
        }
        Ok(self)
    }

    /// Appends every element of `values` to a repeated field.
    pub fn extend<I, V>(self, name: &str, values: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .try_fold(self, |builder, value| builder.push(name, value))
    }

    /// Appends an enum element to a repeated enum field by name.
    pub fn push_enum(self, name: &str, value: &str) -> Result<Self, SchemaError> {
        let number = self.enum_number(name, value)?;
        self.push(name, Value::Enum(number))
    }

    /// Unsets a field.
    pub fn clear(mut self, name: &str) -> Result<Self, SchemaError> {
        let number = lookup(&self.schema, name)?.number();
        self.fields.remove(&number);
        Ok(self)
    }

    pub fn build(self) -> DynamicMessage {
        DynamicMessage::from_parts(self.schema, self.fields, Vec::new())
    }

    fn enum_number(&self, name: &str, value: &str) -> Result<i32, SchemaError> {
        let field = lookup(&self.schema, name)?;
        let Some(descriptor) = self.schema.enum_descriptor(field) else {
            return Err(self.type_error(field));
        };
        descriptor
            .number_of(value)
            .ok_or_else(|| SchemaError::UnknownEnumValue {
                enum_name: descriptor.name().to_string(),
                value: value.to_string(),
            })
    }

    fn check(&self, field: &FieldDescriptor, value: &Value) -> Result<(), SchemaError> {
        let ok = match (field.field_type(), value) {
            (FieldType::Double, Value::F64(_))
            | (FieldType::Float, Value::F32(_))
            | (FieldType::Int32 | FieldType::SInt32 | FieldType::SFixed32, Value::I32(_))
            | (FieldType::Int64 | FieldType::SInt64 | FieldType::SFixed64, Value::I64(_))
            | (FieldType::UInt32 | FieldType::Fixed32, Value::U32(_))
            | (FieldType::UInt64 | FieldType::Fixed64, Value::U64(_))
            | (FieldType::Bool, Value::Bool(_))
            | (FieldType::String, Value::String(_))
            | (FieldType::Bytes, Value::Bytes(_)) => true,
            (FieldType::Enum(_), Value::Enum(number)) => {
                let declared = self
                    .schema
                    .enum_descriptor(field)
                    .is_some_and(|e| e.name_of(*number).is_some());
                if !declared {
                    let enum_name = field.field_type().type_name().unwrap_or_default();
                    return Err(SchemaError::UnknownEnumValue {
                        enum_name: enum_name.to_string(),
                        value: number.to_string(),
                    });
                }
                true
            }
            (FieldType::Message(_), Value::Message(nested)) => {
                self.schema.field_accepts(field, nested.schema())
            }
            _ => false,
        };
        if ok { Ok(()) } else { Err(self.type_error(field)) }
    }

    fn type_error(&self, field: &FieldDescriptor) -> SchemaError {
        SchemaError::TypeMismatch {
            message: self.schema.name().to_string(),
            field: field.name().to_string(),
            expected: field.field_type().to_string(),
        }
    }

    fn cardinality_error(&self, field: &FieldDescriptor, cardinality: &'static str) -> SchemaError {
        SchemaError::CardinalityMismatch {
            message: self.schema.name().to_string(),
            field: field.name().to_string(),
            cardinality,
        }
    }
}

/// Setters clone the schema handle and look fields up through the clone,
/// which keeps the descriptor borrow apart from `self.fields`.
fn lookup<'s>(schema: &'s Schema, name: &str) -> Result<&'s FieldDescriptor, SchemaError> {
    schema
        .field_by_name(name)
        .ok_or_else(|| SchemaError::UnknownField {
            message: schema.name().to_string(),
            field: name.to_string(),
        })
}
