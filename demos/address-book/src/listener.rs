//! Logs every address book that arrives on the topic.

use protolane::prelude::*;

#[derive(Debug, Default)]
pub struct AddressBookListener {
    pub books: usize,
    pub people: usize,
}

impl RecordHandler<DynamicMessage> for AddressBookListener {
    async fn on_message(&mut self, record: &Record, book: DynamicMessage) -> Result<(), String> {
        let people = book.repeated("people");
        tracing::info!(
            key = record.key.as_deref(),
            offset = %record.offset,
            people = people.len(),
            "received address book"
        );

        for person in people.iter().filter_map(Value::as_message) {
            let id = person.get("id").and_then(Value::as_i32).unwrap_or_default();
            tracing::info!(
                name = person.get_str("name").unwrap_or_default(),
                id,
                email = person.get_str("email").unwrap_or_default(),
                "person"
            );
            let phones = person.repeated("phones");
            tracing::info!(count = phones.len(), "  phone numbers");
            for phone in phones.iter().filter_map(Value::as_message) {
                tracing::info!(
                    "    {}: {}",
                    phone.get_enum_name("type").unwrap_or("PHONE_TYPE_UNSPECIFIED"),
                    phone.get_str("number").unwrap_or_default()
                );
            }
        }

        self.books += 1;
        self.people += people.len();
        Ok(())
    }

    async fn on_tombstone(&mut self, record: &Record) -> Result<(), String> {
        tracing::info!(key = record.key.as_deref(), "address book deleted");
        Ok(())
    }
}
