//! Address-book schema and request conversion.

use protolane::codec::{DescriptorPool, DynamicMessage, Schema, SchemaError};
use serde::{Deserialize, Serialize};

pub const SCHEMA_JSON: &str = include_str!("../schema/addressbook.json");

pub const ADDRESS_BOOK: &str = "tutorial.AddressBook";
pub const PERSON: &str = "tutorial.Person";
pub const PHONE_NUMBER: &str = "tutorial.Person.PhoneNumber";

/// The three message schemas the demo works with.
#[derive(Clone)]
pub struct Schemas {
    pub address_book: Schema,
    pub person: Schema,
    pub phone_number: Schema,
}

impl Schemas {
    pub fn load() -> Result<Self, SchemaError> {
        let pool = DescriptorPool::from_json(SCHEMA_JSON)?;
        Ok(Self {
            address_book: pool.schema(ADDRESS_BOOK)?,
            person: pool.schema(PERSON)?,
            phone_number: pool.schema(PHONE_NUMBER)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressBookRequest {
    #[serde(default)]
    pub people: Vec<PersonRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRequest {
    pub name: String,
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phones: Vec<PhoneRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneRequest {
    pub number: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Maps a free-form phone type to the enum value name.
/// Case-insensitive; anything unrecognized is `PHONE_TYPE_UNSPECIFIED`.
pub fn phone_type(kind: Option<&str>) -> &'static str {
    match kind.map(str::to_ascii_uppercase).as_deref() {
        Some("MOBILE") => "PHONE_TYPE_MOBILE",
        Some("HOME") => "PHONE_TYPE_HOME",
        Some("WORK") => "PHONE_TYPE_WORK",
        _ => "PHONE_TYPE_UNSPECIFIED",
    }
}

impl AddressBookRequest {
    /// Builds the `tutorial.AddressBook` message for this request.
    pub fn to_message(&self, schemas: &Schemas) -> Result<DynamicMessage, SchemaError> {
        let people = self
            .people
            .iter()
            .map(|person| person.to_message(schemas))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schemas
            .address_book
            .new_message()
            .extend("people", people)?
            .build())
    }

    /// Ahmed with no phones, Jhon with one mobile number.
    pub fn sample() -> Self {
        Self {
            people: vec![
                PersonRequest {
                    name: "Ahmed".into(),
                    id: None,
                    email: Some("ahmed@gmail.com".into()),
                    phones: Vec::new(),
                },
                PersonRequest {
                    name: "Jhon".into(),
                    id: None,
                    email: Some("jhon@gmail.com".into()),
                    phones: vec![PhoneRequest {
                        number: "0123235235".into(),
                        kind: Some("mobile".into()),
                    }],
                },
            ],
        }
    }
}

impl PersonRequest {
    fn to_message(&self, schemas: &Schemas) -> Result<DynamicMessage, SchemaError> {
        let mut builder = schemas.person.new_message().set("name", self.name.as_str())?;
        if let Some(id) = self.id {
            builder = builder.set("id", id)?;
        }
        if let Some(email) = &self.email {
            builder = builder.set("email", email.as_str())?;
        }
        for phone in &self.phones {
            let number = schemas
                .phone_number
                .new_message()
                .set("number", phone.number.as_str())?
                .set_enum("type", phone_type(phone.kind.as_deref()))?
                .build();
            builder = builder.push("phones", number)?;
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_loads() {
        let schemas = Schemas::load().unwrap();
        assert_eq!(schemas.address_book.name(), ADDRESS_BOOK);
        assert!(schemas.person.field_by_name("phones").unwrap().is_repeated());
    }

    #[test]
    fn test_phone_type_mapping() {
        assert_eq!(phone_type(Some("MOBILE")), "PHONE_TYPE_MOBILE");
        assert_eq!(phone_type(Some("home")), "PHONE_TYPE_HOME");
        assert_eq!(phone_type(Some("Work")), "PHONE_TYPE_WORK");
        assert_eq!(phone_type(Some("pager")), "PHONE_TYPE_UNSPECIFIED");
        assert_eq!(phone_type(None), "PHONE_TYPE_UNSPECIFIED");
    }

    #[test]
    fn test_sample_book() {
        let schemas = Schemas::load().unwrap();
        let book = AddressBookRequest::sample().to_message(&schemas).unwrap();
        assert_eq!(
            book.to_string(),
            concat!(
                r#"people { name: "Ahmed" email: "ahmed@gmail.com" } "#,
                r#"people { name: "Jhon" email: "jhon@gmail.com" "#,
                r#"phones { number: "0123235235" type: PHONE_TYPE_MOBILE } }"#,
            )
        );
    }

    #[test]
    fn test_request_from_json() {
        let schemas = Schemas::load().unwrap();
        let request: AddressBookRequest = serde_json::from_str(
            r#"{ "people": [ { "name": "Mira", "id": 0, "phones": [
                { "number": "1", "type": "work" }, { "number": "2" }
            ] } ] }"#,
        )
        .unwrap();
        let book = request.to_message(&schemas).unwrap();
        let mira = book.repeated("people")[0].as_message().unwrap();
        assert!(mira.has("id"));
        assert!(!mira.has("email"));
        let kinds: Vec<_> = mira
            .repeated("phones")
            .iter()
            .map(|p| p.as_message().unwrap().get_enum_name("type").unwrap())
            .collect();
        assert_eq!(kinds, vec!["PHONE_TYPE_WORK", "PHONE_TYPE_UNSPECIFIED"]);
    }
}
