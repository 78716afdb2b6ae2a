//! Schema-driven protobuf wire codec for Protolane.
//!
//! This crate turns structured messages into the bytes a publish/subscribe
//! transport carries, and back:
//!
//! - **Schemas** ([`DescriptorPool`], [`Schema`], [`FieldDescriptor`]):
//!   what a message looks like, built and validated once.
//! - **Messages** ([`DynamicMessage`], [`MessageBuilder`], [`Value`]):
//!   immutable values that conform to one schema.
//! - **Codec** ([`Encoder`], [`Decoder`], the [`Serializer`] and
//!   [`Deserializer`] traits): protobuf binary encoding with tombstone
//!   handling for empty payloads.
//! - **Errors** ([`SerializationError`], [`DeserializationError`],
//!   [`SchemaError`]): kept apart so producers and consumers can react
//!   to each differently.
//!
//! # Architecture
//!
//! The codec sits between the transport (raw payload bytes keyed by topic)
//! and application code (typed records). It never talks to a broker and
//! never resolves schemas from the wire; the consumer binds its decoder to
//! a schema up front.
//!
//! ```text
//! Producer: DynamicMessage → Encoder → Bytes → transport
//! Consumer: transport → Option<&[u8]> → Decoder → Decoded::{Message, Tombstone}
//! ```
//!
//! # Example
//!
//! ```
//! use protolane_codec::{
//!     Decoded, Decoder, DescriptorPool, Encoder, FieldDescriptor, FieldType, MessageDescriptor,
//! };
//!
//! let pool = DescriptorPool::builder()
//!     .message(
//!         MessageDescriptor::new("demo.Greeting")
//!             .field(FieldDescriptor::optional("text", 1, FieldType::String)),
//!     )
//!     .build()?;
//! let schema = pool.schema("demo.Greeting")?;
//!
//! let hello = schema.new_message().set("text", "hello")?.build();
//! let bytes = Encoder::new().encode("greetings", Some(&hello))?;
//! assert_eq!(&bytes[..], b"\x0a\x05hello");
//!
//! let decoded = Decoder::new(schema).decode("greetings", Some(&bytes))?;
//! assert_eq!(decoded, Decoded::Message(hello));
//! # Ok::<(), protolane_codec::CodecError>(())
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod config;
mod decoder;
#[cfg(feature = "json")]
mod definition;
mod encoder;
mod error;
mod schema;
mod value;
pub mod wire;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Deserializer, Serializer};
pub use config::{CodecConfig, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_RECURSION_LIMIT};
pub use decoder::{Decoded, Decoder};
#[cfg(feature = "json")]
pub use definition::{
    EnumDefinition, EnumValueDefinition, FieldDefinition, FieldKind, MessageDefinition,
    PoolDefinition,
};
pub use encoder::Encoder;
pub use error::{CodecError, DeserializationError, SchemaError, SerializationError};
pub use schema::{
    Cardinality, DescriptorPool, DescriptorPoolBuilder, EnumDescriptor, EnumValue,
    FieldDescriptor, FieldType, MessageDescriptor, Schema,
};
pub use value::{DynamicMessage, MessageBuilder, UnknownField, Value};
pub use wire::WireType;
