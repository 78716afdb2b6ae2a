//! Publish/subscribe transport layer for Protolane.
//!
//! Provides the [`Producer`] and [`Consumer`] traits that abstract over
//! the thing that actually moves payload bytes between services, plus
//! [`TopicBus`], an in-process implementation built on tokio channels.
//!
//! The transport never looks inside a payload. It moves [`Record`]s: a
//! topic, an optional key, and an optional payload. An absent payload is
//! a tombstone; deciding what that means is the consumer's job.

#![allow(async_fn_in_trait)]

mod bus;
mod error;

pub use bus::{BusConsumer, BusProducer, TopicBus};
pub use error::TransportError;

use std::fmt;

use bytes::Bytes;

/// Position of a record within its topic.
///
/// Offsets start at 0 and increase by one per record sent to the topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(u64);

impl Offset {
    pub fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// One unit of data on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Topic the record belongs to.
    pub topic: String,
    /// Optional partitioning key.
    pub key: Option<String>,
    /// Encoded value; `None` is a tombstone.
    pub payload: Option<Bytes>,
    /// Assigned by the transport when the record is sent.
    pub offset: Offset,
}

impl Record {
    /// A record carrying `payload`.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: Some(payload.into()),
            offset: Offset::default(),
        }
    }

    /// A record with no payload.
    pub fn tombstone(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: None,
            offset: Offset::default(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    /// Payload bytes, if any.
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }
}

/// Sends records to topics.
pub trait Producer: Send + Sync + 'static {
    /// The error type for send operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends a record and returns the offset it was assigned.
    ///
    /// Waits when a subscriber's queue is full.
    async fn send(&self, record: Record) -> Result<Offset, Self::Error>;
}

/// Receives the records of one topic for one consumer group.
pub trait Consumer: Send + Sync + 'static {
    /// The error type for receive operations.
    type Error: std::error::Error + Send + Sync;

    /// Receives the next record.
    ///
    /// Returns `Ok(None)` when no more records can ever arrive.
    async fn recv(&self) -> Result<Option<Record>, Self::Error>;

    /// The topic this consumer reads.
    fn topic(&self) -> &str;

    /// The consumer group this consumer belongs to.
    fn group(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_new_and_into_inner() {
        let offset = Offset::new(42);
        assert_eq!(offset.into_inner(), 42);
    }

    #[test]
    fn test_offset_display() {
        assert_eq!(Offset::new(7).to_string(), "@7");
    }

    #[test]
    fn test_offset_ordering() {
        assert!(Offset::new(1) < Offset::new(2));
        assert_eq!(Offset::default(), Offset::new(0));
    }

    #[test]
    fn test_record_constructors() {
        let record = Record::new("people", &b"\x0a\x00"[..]).with_key("k1");
        assert_eq!(record.topic, "people");
        assert_eq!(record.key.as_deref(), Some("k1"));
        assert_eq!(record.payload(), Some(&b"\x0a\x00"[..]));
        assert!(!record.is_tombstone());

        let tombstone = Record::tombstone("people");
        assert!(tombstone.is_tombstone());
        assert_eq!(tombstone.payload(), None);
    }
}
