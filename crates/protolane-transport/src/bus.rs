//! In-process topic bus built on tokio channels.
//!
//! Every `(topic, group)` pair gets its own bounded queue. A record sent to
//! a topic is copied into the queue of every group subscribed at that
//! moment; there is no retention, so a group that subscribes later only
//! sees later records. Within a group there is exactly one consumer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::{Consumer, Offset, Producer, Record, TransportError};

#[derive(Default)]
struct Topic {
    next_offset: u64,
    groups: HashMap<String, mpsc::Sender<Record>>,
}

#[derive(Default)]
struct BusState {
    closed: bool,
    topics: HashMap<String, Topic>,
}

struct BusInner {
    capacity: usize,
    state: Mutex<BusState>,
}

/// An in-memory publish/subscribe bus.
///
/// Dropping the bus and every [`BusProducer`] ends all subscriptions:
/// consumers drain what is queued and then receive `Ok(None)`.
#[derive(Clone)]
pub struct TopicBus {
    inner: Arc<BusInner>,
}

impl TopicBus {
    /// Creates a bus whose per-group queues hold up to `capacity` records.
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    /// Returns a producer handle sharing this bus.
    pub fn producer(&self) -> BusProducer {
        BusProducer {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Subscribes `group` to `topic`.
    ///
    /// # Errors
    /// [`TransportError::Closed`] after [`close`](Self::close),
    /// [`TransportError::InvalidTopic`] for an empty topic name, and
    /// [`TransportError::GroupAlreadySubscribed`] when the group already has
    /// a live consumer on the topic.
    pub async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<BusConsumer, TransportError> {
        if topic.is_empty() {
            return Err(TransportError::InvalidTopic(topic.to_string()));
        }

        let mut state = self.inner.state.lock().await;
        if state.closed {
            return Err(TransportError::Closed);
        }

        let entry = state.topics.entry(topic.to_string()).or_default();
        if let Some(existing) = entry.groups.get(group) {
            if !existing.is_closed() {
                return Err(TransportError::GroupAlreadySubscribed {
                    topic: topic.to_string(),
                    group: group.to_string(),
                });
            }
        }

        let (tx, rx) = mpsc::channel(self.inner.capacity);
        entry.groups.insert(group.to_string(), tx);
        tracing::debug!(topic, group, "consumer subscribed");

        Ok(BusConsumer {
            topic: topic.to_string(),
            group: group.to_string(),
            rx: Mutex::new(rx),
        })
    }

    /// Closes the bus. Queued records are still delivered; after that every
    /// consumer receives `Ok(None)` and every send fails.
    pub async fn close(&self) {
        let mut state = self.inner.state.lock().await;
        state.closed = true;
        state.topics.clear();
        tracing::info!("bus closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.closed
    }
}

/// Sends records into a [`TopicBus`].
#[derive(Clone)]
pub struct BusProducer {
    inner: Arc<BusInner>,
}

impl Producer for BusProducer {
    type Error = TransportError;

    async fn send(&self, mut record: Record) -> Result<Offset, Self::Error> {
        if record.topic.is_empty() {
            return Err(TransportError::InvalidTopic(record.topic));
        }

        // Resolve targets under the lock, deliver outside it so a full
        // queue never blocks other producers or subscribers.
        let targets: Vec<(String, mpsc::Sender<Record>)> = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(TransportError::Closed);
            }
            let topic = state.topics.entry(record.topic.clone()).or_default();
            topic.groups.retain(|_, tx| !tx.is_closed());
            record.offset = Offset::new(topic.next_offset);
            topic.next_offset += 1;
            topic
                .groups
                .iter()
                .map(|(group, tx)| (group.clone(), tx.clone()))
                .collect()
        };

        let offset = record.offset;
        if targets.is_empty() {
            tracing::trace!(topic = %record.topic, %offset, "no subscribers, record dropped");
            return Ok(offset);
        }

        for (group, tx) in targets {
            if tx.send(record.clone()).await.is_err() {
                tracing::debug!(topic = %record.topic, group = %group, "consumer went away");
            }
        }
        tracing::trace!(
            topic = %record.topic,
            %offset,
            tombstone = record.is_tombstone(),
            "record sent"
        );
        Ok(offset)
    }
}

/// The single consumer of one group on one topic.
pub struct BusConsumer {
    topic: String,
    group: String,
    rx: Mutex<mpsc::Receiver<Record>>,
}

impl Consumer for BusConsumer {
    type Error = TransportError;

    async fn recv(&self) -> Result<Option<Record>, Self::Error> {
        Ok(self.rx.lock().await.recv().await)
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    fn group(&self) -> &str {
        &self.group
    }
}
