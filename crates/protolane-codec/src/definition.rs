//! Loading a [`DescriptorPool`] from a JSON definition.
//!
//! The format mirrors a `.proto` file closely enough to be written by hand:
//!
//! ```json
//! {
//!   "messages": [
//!     {
//!       "name": "tutorial.Person",
//!       "fields": [
//!         { "name": "name", "number": 1, "type": "string" },
//!         { "name": "phones", "number": 4, "type": "message",
//!           "type_name": "tutorial.PhoneNumber", "label": "repeated" }
//!       ]
//!     }
//!   ],
//!   "enums": [
//!     { "name": "tutorial.PhoneType",
//!       "values": [ { "name": "PHONE_TYPE_UNSPECIFIED", "number": 0 } ] }
//!   ]
//! }
//! ```
//!
//! `label` defaults to `optional`; `packed` defaults to the usual rule
//! (repeated scalar numerics are packed).

use serde::{Deserialize, Serialize};

use crate::{
    Cardinality, DescriptorPool, EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor,
    SchemaError,
};

/// Top level of a schema definition file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolDefinition {
    #[serde(default)]
    pub messages: Vec<MessageDefinition>,
    #[serde(default)]
    pub enums: Vec<EnumDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub number: u32,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Referenced type for `enum` and `message` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub label: Cardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packed: Option<bool>,
}

/// The `type` key of a field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Enum,
    Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDefinition {
    pub name: String,
    pub values: Vec<EnumValueDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumValueDefinition {
    pub name: String,
    pub number: i32,
}

impl FieldDefinition {
    fn field_type(&self, message: &str) -> Result<FieldType, SchemaError> {
        let named = |wrap: fn(String) -> FieldType| {
            self.type_name.clone().map(wrap).ok_or_else(|| {
                SchemaError::InvalidDefinition(format!(
                    "{message}.{}: `type_name` is required for {:?} fields",
                    self.name, self.kind
                ))
            })
        };
        Ok(match self.kind {
            FieldKind::Double => FieldType::Double,
            FieldKind::Float => FieldType::Float,
            FieldKind::Int32 => FieldType::Int32,
            FieldKind::Int64 => FieldType::Int64,
            FieldKind::Uint32 => FieldType::UInt32,
            FieldKind::Uint64 => FieldType::UInt64,
            FieldKind::Sint32 => FieldType::SInt32,
            FieldKind::Sint64 => FieldType::SInt64,
            FieldKind::Fixed32 => FieldType::Fixed32,
            FieldKind::Fixed64 => FieldType::Fixed64,
            FieldKind::Sfixed32 => FieldType::SFixed32,
            FieldKind::Sfixed64 => FieldType::SFixed64,
            FieldKind::Bool => FieldType::Bool,
            FieldKind::String => FieldType::String,
            FieldKind::Bytes => FieldType::Bytes,
            FieldKind::Enum => named(FieldType::Enum)?,
            FieldKind::Message => named(FieldType::Message)?,
        })
    }

    fn to_descriptor(&self, message: &str) -> Result<FieldDescriptor, SchemaError> {
        let field_type = self.field_type(message)?;
        let field = match self.label {
            Cardinality::Optional => FieldDescriptor::optional(&self.name, self.number, field_type),
            Cardinality::Required => FieldDescriptor::required(&self.name, self.number, field_type),
            Cardinality::Repeated => FieldDescriptor::repeated(&self.name, self.number, field_type),
        };
        Ok(match self.packed {
            Some(packed) => field.packed(packed),
            None => field,
        })
    }
}

impl PoolDefinition {
    /// Converts the definition into descriptors and validates them.
    ///
    /// # Errors
    /// [`SchemaError::InvalidDefinition`] for a reference field without a
    /// `type_name`, or any error [`DescriptorPoolBuilder::build`] reports.
    ///
    /// [`DescriptorPoolBuilder::build`]: crate::DescriptorPoolBuilder::build
    pub fn build(&self) -> Result<DescriptorPool, SchemaError> {
        let mut builder = DescriptorPool::builder();
        for message in &self.messages {
            let mut descriptor = MessageDescriptor::new(&message.name);
            for field in &message.fields {
                descriptor = descriptor.field(field.to_descriptor(&message.name)?);
            }
            builder = builder.message(descriptor);
        }
        for enumeration in &self.enums {
            let descriptor = enumeration
                .values
                .iter()
                .fold(EnumDescriptor::new(&enumeration.name), |e, v| {
                    e.value(&v.name, v.number)
                });
            builder = builder.enumeration(descriptor);
        }
        builder.build()
    }
}

impl DescriptorPool {
    /// Parses and validates a JSON schema definition.
    ///
    /// # Errors
    /// [`SchemaError::Json`] if the text is not a valid definition, otherwise
    /// whatever [`PoolDefinition::build`] reports.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let definition: PoolDefinition = serde_json::from_str(json)?;
        definition.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"{
        "messages": [
            { "name": "t.Tree", "fields": [
                { "name": "label", "number": 1, "type": "string", "label": "required" },
                { "name": "weights", "number": 2, "type": "sint32", "label": "repeated", "packed": false },
                { "name": "children", "number": 3, "type": "message",
                  "type_name": "t.Tree", "label": "repeated" },
                { "name": "kind", "number": 4, "type": "enum", "type_name": "t.Kind" }
            ] }
        ],
        "enums": [
            { "name": "t.Kind", "values": [
                { "name": "LEAF", "number": 0 },
                { "name": "BRANCH", "number": 1 }
            ] }
        ]
    }"#;

    #[test]
    fn test_from_json_builds_pool() {
        let pool = DescriptorPool::from_json(TREE).unwrap();
        let schema = pool.schema("t.Tree").unwrap();

        let label = schema.field_by_name("label").unwrap();
        assert!(label.is_required());
        assert_eq!(label.field_type(), &FieldType::String);

        let weights = schema.field_by_number(2).unwrap();
        assert!(weights.is_repeated());
        assert!(!weights.is_packed());

        let children = schema.field_by_name("children").unwrap();
        assert_eq!(schema.message_schema(children).unwrap(), schema);

        assert_eq!(pool.enumeration("t.Kind").unwrap().number_of("BRANCH"), Some(1));
    }

    #[test]
    fn test_missing_type_name_rejected() {
        let json = r#"{ "messages": [ { "name": "t.M", "fields": [
            { "name": "other", "number": 1, "type": "message" }
        ] } ] }"#;
        let err = DescriptorPool::from_json(json).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefinition(msg) if msg.contains("t.M.other")));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = DescriptorPool::from_json(r#"{ "messages": [ { "fields": [] } ] }"#).unwrap_err();
        assert!(matches!(err, SchemaError::Json(_)));
    }

    #[test]
    fn test_unknown_type_keyword_rejected() {
        let json = r#"{ "messages": [ { "name": "t.M", "fields": [
            { "name": "x", "number": 1, "type": "varchar" }
        ] } ] }"#;
        assert!(matches!(DescriptorPool::from_json(json), Err(SchemaError::Json(_))));
    }

    #[test]
    fn test_validation_still_applies() {
        let json = r#"{ "messages": [ { "name": "t.M", "fields": [
            { "name": "a", "number": 19500, "type": "bool" }
        ] } ] }"#;
        assert!(matches!(
            DescriptorPool::from_json(json),
            Err(SchemaError::InvalidFieldNumber { number: 19500, .. })
        ));
    }
}
