//! # Protolane
//!
//! Schema-driven protobuf payloads over publish/subscribe topics.
//!
//! Protolane ties the layers together: a [`TypedProducer`] encodes
//! messages with the codec and sends them through a transport; a
//! [`ConsumerPipeline`] receives records, decodes them against a bound
//! schema, and hands messages and tombstones to your [`RecordHandler`].
//!
//! ```text
//! TypedProducer → Encoder → Record → TopicBus → Decoder → RecordHandler
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use protolane::prelude::*;
//!
//! struct Printer;
//!
//! impl RecordHandler<DynamicMessage> for Printer {
//!     async fn on_message(&mut self, _record: &Record, message: DynamicMessage) -> Result<(), String> {
//!         println!("{message}");
//!         Ok(())
//!     }
//! }
//!
//! # async fn demo(schema: Schema, book: DynamicMessage) -> Result<(), ProtolaneError> {
//! let config = PipelineConfig::default();
//! let bus = TopicBus::new(config.channel_capacity);
//! let mut pipeline = ConsumerPipeline::subscribe(&bus, &config, schema, Printer).await?;
//!
//! let producer = TypedProducer::for_bus(&bus, &config);
//! producer.send(Some("book-1"), &book).await?;
//! drop((producer, bus));
//!
//! pipeline.run().await?;
//! # Ok(())
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod pipeline;
mod producer;

pub use config::{ErrorPolicy, GROUP_ENV, PipelineConfig, TOPIC_ENV};
pub use error::ProtolaneError;
pub use pipeline::{ConsumerPipeline, PipelineReport, RecordHandler};
pub use producer::TypedProducer;

pub use protolane_codec as codec;
pub use protolane_transport as transport;

/// Everything an application usually needs, in one import.
pub mod prelude {
    pub use crate::{
        ConsumerPipeline, ErrorPolicy, PipelineConfig, PipelineReport, ProtolaneError,
        RecordHandler, TypedProducer,
    };
    pub use protolane_codec::{
        Decoded, Decoder, DescriptorPool, DynamicMessage, Encoder, Schema, Value,
    };
    pub use protolane_transport::{Consumer, Producer, Record, TopicBus};
}
