//! Typed producer: serialize, then send.

use protolane_codec::{Encoder, Serializer};
use protolane_transport::{BusProducer, Offset, Producer, Record, TopicBus};

use crate::{PipelineConfig, ProtolaneError};

/// Publishes values of one type to one topic.
///
/// Serialization happens before anything touches the transport, so a
/// [`SerializationError`](protolane_codec::SerializationError) never leaves
/// a half-sent record behind.
pub struct TypedProducer<P, S = Encoder> {
    producer: P,
    serializer: S,
    topic: String,
}

impl TypedProducer<BusProducer, Encoder> {
    /// A producer for `config.topic` on `bus`, encoding with
    /// `config.codec` limits.
    pub fn for_bus(bus: &TopicBus, config: &PipelineConfig) -> Self {
        Self::new(
            bus.producer(),
            Encoder::with_config(config.codec),
            config.topic.clone(),
        )
    }
}

impl<P, S> TypedProducer<P, S>
where
    P: Producer,
    ProtolaneError: From<P::Error>,
{
    pub fn new(producer: P, serializer: S, topic: impl Into<String>) -> Self {
        Self {
            producer,
            serializer,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Serializes `value` and sends it.
    ///
    /// # Errors
    /// [`ProtolaneError::Serialization`] if the value cannot be encoded,
    /// [`ProtolaneError::Transport`] if the send fails.
    pub async fn send<T>(&self, key: Option<&str>, value: &T) -> Result<Offset, ProtolaneError>
    where
        S: Serializer<T>,
    {
        let payload = self.serializer.serialize(&self.topic, Some(value))?;
        let len = payload.len();
        let offset = self.producer.send(self.record(key, Some(payload))).await?;
        tracing::debug!(topic = %self.topic, key, len, %offset, "published record");
        Ok(offset)
    }

    /// Sends a record with no payload, marking `key` as deleted.
    pub async fn send_tombstone(&self, key: Option<&str>) -> Result<Offset, ProtolaneError> {
        let offset = self.producer.send(self.record(key, None)).await?;
        tracing::debug!(topic = %self.topic, key, %offset, "published tombstone");
        Ok(offset)
    }

    fn record(&self, key: Option<&str>, payload: Option<bytes::Bytes>) -> Record {
        let record = match payload {
            Some(payload) => Record::new(self.topic.as_str(), payload),
            None => Record::tombstone(self.topic.as_str()),
        };
        match key {
            Some(key) => record.with_key(key),
            None => record,
        }
    }
}
