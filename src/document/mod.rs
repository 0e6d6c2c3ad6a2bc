//! Document store port.
//!
//! Documents are flat maps of typed field values, addressed by collection and
//! id. Writes may carry [`FieldValue::ServerTimestamp`], which the store
//! replaces with its own clock when the write is applied.
mod memory;
mod postgres;

pub use memory::*;
pub use postgres::*;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors raised by a [`DocumentStore`].
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Stored field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[serde(rename = "booleanValue")]
    Boolean(bool),
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "timestampValue")]
    Timestamp(DateTime<Utc>),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

/// A document as read back from a store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Value of `field` when it holds a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(Value::String(value)) => Some(value),
            _ => None,
        }
    }

    /// Value of `field` when it holds a boolean.
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        match self.fields.get(field) {
            Some(Value::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    /// Value of `field` when it holds a timestamp.
    pub fn get_timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        match self.fields.get(field) {
            Some(Value::Timestamp(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Field value of a pending write.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Value(Value),
    /// Resolved to the store time when the write is applied.
    ServerTimestamp,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

macro_rules! field_value_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for FieldValue {
            fn from(value: $ty) -> Self {
                FieldValue::Value(value.into())
            }
        })*
    };
}

field_value_from!(bool, String, &str, DateTime<Utc>);

/// Sentinel for a server-assigned timestamp.
pub fn server_timestamp() -> FieldValue {
    FieldValue::ServerTimestamp
}

/// Full replacement of a document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentWrite {
    fields: BTreeMap<String, FieldValue>,
}

impl DocumentWrite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field` to `value`.
    pub fn set(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.to_owned(), value.into());
        self
    }

    /// Pending value of `field`.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Turn the write into a [`Document`], replacing server timestamps by
    /// `now`.
    pub fn resolve(self, now: DateTime<Utc>) -> Document {
        let fields = self
            .fields
            .into_iter()
            .map(|(field, value)| {
                let value = match value {
                    FieldValue::Value(value) => value,
                    FieldValue::ServerTimestamp => Value::Timestamp(now),
                };
                (field, value)
            })
            .collect();

        Document { fields }
    }
}

/// Port for document persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read `collection/id`, `None` if it does not exist.
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocumentError>;

    /// Create or replace `collection/id`.
    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), DocumentError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_server_timestamps() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let write = DocumentWrite::new()
            .set("email", "user@example.com")
            .set("emailVerified", false)
            .set("createdAt", server_timestamp())
            .set("updatedAt", server_timestamp());

        assert_eq!(write.get("createdAt"), Some(&FieldValue::ServerTimestamp));

        let document = write.resolve(now);
        assert_eq!(document.len(), 4);
        assert_eq!(document.get_str("email"), Some("user@example.com"));
        assert_eq!(document.get_bool("emailVerified"), Some(false));
        assert_eq!(document.get_timestamp("createdAt"), Some(now));
        assert_eq!(document.get_timestamp("updatedAt"), Some(now));
        assert_eq!(document.get_str("createdAt"), None);
    }

    #[test]
    fn test_wire_format() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let document = DocumentWrite::new()
            .set("role", "user")
            .set("emailVerified", false)
            .set("createdAt", now)
            .resolve(now);

        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "role": { "stringValue": "user" },
                "emailVerified": { "booleanValue": false },
                "createdAt": { "timestampValue": "2025-03-01T12:00:00Z" },
            })
        );

        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back, document);
    }
}
