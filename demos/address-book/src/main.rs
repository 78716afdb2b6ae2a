use protolane::prelude::*;
use tracing_subscriber::EnvFilter;

mod book;
mod config;
mod listener;

use book::{AddressBookRequest, Schemas};
use config::DemoConfig;
use listener::AddressBookListener;

// ---------------------------------------------------------------------------
// Codec round trip
// ---------------------------------------------------------------------------

/// Serializes `book`, logs the bytes, deserializes them and logs the result.
fn round_trip(
    schemas: &Schemas,
    config: &PipelineConfig,
    book: &DynamicMessage,
) -> Result<Decoded, ProtolaneError> {
    let encoder = Encoder::with_config(config.codec).bound_to(schemas.address_book.clone());
    let decoder = Decoder::with_config(schemas.address_book.clone(), config.codec);

    let bytes = encoder.encode(&config.topic, Some(book))?;
    tracing::info!(len = bytes.len(), "serialized address book: {:?}", bytes.as_ref());

    let decoded = decoder.decode(&config.topic, Some(&bytes))?;
    match &decoded {
        Decoded::Message(book) => tracing::info!("deserialized address book: {book}"),
        Decoded::Tombstone => tracing::info!("deserialized address book: <tombstone>"),
    }
    Ok(decoded)
}

// ---------------------------------------------------------------------------
// Publish / listen
// ---------------------------------------------------------------------------

/// Publishes every book to the topic while a listener consumes them.
async fn publish_and_listen(
    schemas: &Schemas,
    config: &PipelineConfig,
    books: &[DynamicMessage],
) -> Result<(PipelineReport, AddressBookListener), ProtolaneError> {
    let bus = TopicBus::new(config.channel_capacity);
    let mut pipeline = ConsumerPipeline::subscribe(
        &bus,
        config,
        schemas.address_book.clone(),
        AddressBookListener::default(),
    )
    .await?;
    let producer = TypedProducer::for_bus(&bus, config);

    // Dropping the producer and the bus at the end ends the listener's run.
    let publish = async move {
        for (i, book) in books.iter().enumerate() {
            let key = format!("book-{i}");
            let offset = producer.send(Some(&key), book).await?;
            tracing::info!(
                topic = producer.topic(),
                key = %key,
                %offset,
                people = book.repeated("people").len(),
                "sent address book"
            );
        }
        drop(producer);
        drop(bus);
        Ok::<_, ProtolaneError>(())
    };

    let (published, report) = tokio::join!(publish, pipeline.run());
    published?;
    let report = report?;
    Ok((report, pipeline.into_handler()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = DemoConfig::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let schemas = Schemas::load()?;
    let book = AddressBookRequest::sample().to_message(&schemas)?;

    round_trip(&schemas, &config.pipeline, &book)?;

    let (report, listener) =
        publish_and_listen(&schemas, &config.pipeline, std::slice::from_ref(&book)).await?;
    tracing::info!(
        books = listener.books,
        people = listener.people,
        skipped = report.skipped,
        "done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_sample_book() {
        let schemas = Schemas::load().unwrap();
        let book = AddressBookRequest::sample().to_message(&schemas).unwrap();
        let decoded = round_trip(&schemas, &PipelineConfig::default(), &book).unwrap();
        assert_eq!(decoded, Decoded::Message(book));
    }

    #[test]
    fn test_round_trip_empty_book_is_tombstone() {
        let schemas = Schemas::load().unwrap();
        let book = AddressBookRequest::default().to_message(&schemas).unwrap();
        let decoded = round_trip(&schemas, &PipelineConfig::default(), &book).unwrap();
        assert!(decoded.is_tombstone());
    }

    #[test]
    fn test_round_trip_rejects_other_message_type() {
        let schemas = Schemas::load().unwrap();
        let person = schemas.person.new_message().set("name", "x").unwrap().build();
        let err = round_trip(&schemas, &PipelineConfig::default(), &person).unwrap_err();
        assert!(matches!(err, ProtolaneError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_publish_more_books_than_queue_capacity() {
        let schemas = Schemas::load().unwrap();
        let book = AddressBookRequest::sample().to_message(&schemas).unwrap();
        let books = vec![book; 5];
        let config = PipelineConfig {
            channel_capacity: 1,
            ..PipelineConfig::default()
        };

        let (report, listener) = publish_and_listen(&schemas, &config, &books).await.unwrap();
        assert_eq!(report.messages, 5);
        assert_eq!(listener.books, 5);
        assert_eq!(listener.people, 10);
    }
}
