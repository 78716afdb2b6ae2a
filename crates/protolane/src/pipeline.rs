//! Consumer pipeline: receive, decode, dispatch.
//!
//! The flow for every record is:
//!   1. Receive from the transport → `None` ends the run
//!   2. Decode the payload → tombstone, message, or error
//!   3. Errors go through the [`ErrorPolicy`]; everything else goes to
//!      the [`RecordHandler`]

use protolane_codec::{Decoded, Decoder, Deserializer, Schema};
use protolane_transport::{BusConsumer, Consumer, Record, TopicBus};

use crate::{ErrorPolicy, PipelineConfig, ProtolaneError};

/// Application code that reacts to decoded records.
///
/// Returning `Err` stops the pipeline with [`ProtolaneError::Handler`].
pub trait RecordHandler<T>: Send + 'static {
    /// Called for every record that decoded to a message.
    async fn on_message(&mut self, record: &Record, message: T) -> Result<(), String>;

    /// Called for every tombstone. Default: log and continue.
    async fn on_tombstone(&mut self, record: &Record) -> Result<(), String> {
        tracing::debug!(topic = %record.topic, key = record.key.as_deref(), "tombstone");
        Ok(())
    }
}

/// Counters for one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Records handed to [`RecordHandler::on_message`].
    pub messages: u64,
    /// Records handed to [`RecordHandler::on_tombstone`].
    pub tombstones: u64,
    /// Records dropped under [`ErrorPolicy::Skip`].
    pub skipped: u64,
}

/// Drives a [`Consumer`] through a [`Deserializer`] into a [`RecordHandler`].
pub struct ConsumerPipeline<C, D, H> {
    consumer: C,
    deserializer: D,
    handler: H,
    policy: ErrorPolicy,
    report: PipelineReport,
}

impl<H> ConsumerPipeline<BusConsumer, Decoder, H>
where
    H: RecordHandler<protolane_codec::DynamicMessage>,
{
    /// Subscribes `config.group_id` to `config.topic` on `bus` and decodes
    /// with `schema`.
    ///
    /// # Errors
    /// [`ProtolaneError::Config`] for an invalid config, or the
    /// subscription's [`ProtolaneError::Transport`] error.
    pub async fn subscribe(
        bus: &TopicBus,
        config: &PipelineConfig,
        schema: Schema,
        handler: H,
    ) -> Result<Self, ProtolaneError> {
        config.validate()?;
        let consumer = bus.subscribe(&config.topic, &config.group_id).await?;
        Ok(Self::new(consumer, Decoder::with_config(schema, config.codec), handler)
            .with_policy(config.on_decode_error))
    }
}

impl<C, D, H> ConsumerPipeline<C, D, H>
where
    C: Consumer,
    D: Deserializer,
    H: RecordHandler<D::Output>,
    ProtolaneError: From<C::Error>,
{
    pub fn new(consumer: C, deserializer: D, handler: H) -> Self {
        Self {
            consumer,
            deserializer,
            handler,
            policy: ErrorPolicy::default(),
            report: PipelineReport::default(),
        }
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Counters so far. Still valid after [`run`](Self::run) fails.
    pub fn report(&self) -> PipelineReport {
        self.report
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Processes records until the transport reports no more will arrive.
    ///
    /// # Errors
    /// - [`ProtolaneError::Transport`] from the consumer. Always fatal.
    /// - [`ProtolaneError::Deserialization`] under [`ErrorPolicy::Halt`].
    /// - [`ProtolaneError::Handler`] when the handler fails.
    pub async fn run(&mut self) -> Result<PipelineReport, ProtolaneError> {
        let topic = self.consumer.topic().to_string();
        let group = self.consumer.group().to_string();
        tracing::info!(%topic, %group, policy = ?self.policy, "consumer pipeline started");

        while let Some(record) = self.consumer.recv().await? {
            self.process(record).await?;
        }

        tracing::info!(
            %topic,
            %group,
            messages = self.report.messages,
            tombstones = self.report.tombstones,
            skipped = self.report.skipped,
            "consumer pipeline finished"
        );
        Ok(self.report)
    }

    async fn process(&mut self, record: Record) -> Result<(), ProtolaneError> {
        let decoded = match self.deserializer.deserialize(&record.topic, record.payload()) {
            Ok(decoded) => decoded,
            Err(error) => match self.policy {
                ErrorPolicy::Skip => {
                    tracing::warn!(
                        topic = %record.topic,
                        offset = %record.offset,
                        %error,
                        "skipping undecodable record"
                    );
                    self.report.skipped += 1;
                    return Ok(());
                }
                ErrorPolicy::Halt => {
                    tracing::error!(
                        topic = %record.topic,
                        offset = %record.offset,
                        %error,
                        "undecodable record, halting"
                    );
                    return Err(error.into());
                }
            },
        };

        match decoded {
            Decoded::Message(message) => {
                self.handler
                    .on_message(&record, message)
                    .await
                    .map_err(ProtolaneError::Handler)?;
                self.report.messages += 1;
            }
            Decoded::Tombstone => {
                self.handler
                    .on_tombstone(&record)
                    .await
                    .map_err(ProtolaneError::Handler)?;
                self.report.tombstones += 1;
            }
        }
        Ok(())
    }
}
