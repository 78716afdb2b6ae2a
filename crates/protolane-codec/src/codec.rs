//! Transport-facing serializer/deserializer traits.
//!
//! A publish/subscribe client does not care how payloads are encoded; it
//! just needs something that turns a value into bytes on the way out and
//! bytes into a value on the way in. These two traits are that seam. The
//! [`Encoder`] and [`Decoder`] implement them for [`DynamicMessage`], and
//! anything else (a JSON codec, a test double) can implement them too.
//!
//! Both traits take the transport key (topic name) so the signature lines
//! up with what a broker client hands its value codecs. Implementations may
//! log it but must not let it change the encoding.

use bytes::Bytes;

use crate::{
    Decoded, Decoder, DeserializationError, DynamicMessage, Encoder, SerializationError,
};

/// Turns values of `T` into payload bytes.
///
/// `Send + Sync + 'static` so one instance can be shared by every task of
/// a producer.
pub trait Serializer<T>: Send + Sync + 'static {
    /// Serializes `value` for the channel named `key`.
    ///
    /// # Errors
    /// [`SerializationError::MissingMessage`] when `value` is `None`, or any
    /// other [`SerializationError`] the format defines.
    fn serialize(&self, key: &str, value: Option<&T>) -> Result<Bytes, SerializationError>;
}

/// Turns payload bytes back into values.
pub trait Deserializer: Send + Sync + 'static {
    /// The value type produced.
    type Output: Send + 'static;

    /// Deserializes a payload received on the channel named `key`.
    ///
    /// Absent or empty payloads yield [`Decoded::Tombstone`].
    ///
    /// # Errors
    /// A [`DeserializationError`] when the payload is malformed.
    fn deserialize(
        &self,
        key: &str,
        data: Option<&[u8]>,
    ) -> Result<Decoded<Self::Output>, DeserializationError>;
}

impl Serializer<DynamicMessage> for Encoder {
    fn serialize(
        &self,
        key: &str,
        value: Option<&DynamicMessage>,
    ) -> Result<Bytes, SerializationError> {
        self.encode(key, value)
    }
}

impl Deserializer for Decoder {
    type Output = DynamicMessage;

    fn deserialize(
        &self,
        key: &str,
        data: Option<&[u8]>,
    ) -> Result<Decoded<DynamicMessage>, DeserializationError> {
        self.decode(key, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DescriptorPool, FieldDescriptor, FieldType, MessageDescriptor};

    // Generic helpers only see the traits, the way a transport would.
    fn round_trip<S, D>(ser: &S, de: &D, value: &D::Output) -> Decoded<D::Output>
    where
        S: Serializer<D::Output>,
        D: Deserializer,
    {
        let bytes = ser.serialize("topic", Some(value)).unwrap();
        de.deserialize("topic", Some(&bytes)).unwrap()
    }

    #[test]
    fn test_encoder_and_decoder_through_traits() {
        let schema = DescriptorPool::builder()
            .message(
                MessageDescriptor::new("t.Ping")
                    .field(FieldDescriptor::optional("seq", 1, FieldType::UInt64)),
            )
            .build()
            .unwrap()
            .schema("t.Ping")
            .unwrap();
        let ping = schema.new_message().set("seq", 42u64).unwrap().build();

        let decoded = round_trip(&Encoder::new(), &Decoder::new(schema), &ping);
        assert_eq!(decoded, Decoded::Message(ping));
    }

    #[test]
    fn test_traits_are_object_safe_enough_to_box() {
        // Serializer is usable as a trait object; transports store it that way.
        let boxed: Box<dyn Serializer<DynamicMessage>> = Box::new(Encoder::new());
        let err = boxed.serialize("topic", None).unwrap_err();
        assert_eq!(err, SerializationError::MissingMessage);
    }
}
