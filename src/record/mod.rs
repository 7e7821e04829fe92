//! Records - the rows exchanged with the remote store and the change feed.
//!
//! `Record` is the untyped row as the hosted data API returns it. Typed code
//! works with `Row<T>`, where `T` is a payload struct bound to a table:
//!
//! ```ignore
//! use synced_rust::{Row, Table};
//!
//! #[derive(Serialize, Deserialize, Clone, PartialEq, Table)]
//! #[table(name = "tasks")]
//! struct Task {
//!     title: String,
//!     completed: bool,
//! }
//!
//! let row: Row<Task> = Row::decode(&record)?;
//! assert_eq!(row.data.title, "Buy milk");
//! ```

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::remote::{ErrorCode, RemoteError};

/// Field names owned by the server. Payloads and patches may not carry them.
pub const RESERVED_FIELDS: [&str; 3] = ["id", "owner_id", "created_at"];

/// Anything a `ReconcilingCache` can hold: a value with a stable unique key.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Trait for payload types stored in a remote table.
pub trait Table: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The remote table name (e.g., "tasks", "loyalty_transactions").
    const TABLE: &'static str;
}

/// A versioned wrapper around row data for optimistic concurrency control.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            data: f(self.data),
            version: self.version,
        }
    }
}

/// An untyped row. The server assigns `id` and `created_at` on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Record {
    /// Look up a field by name. `id` and `owner_id` resolve to the row columns,
    /// anything else to the payload.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::String(self.id.clone())),
            "owner_id" => Some(Value::String(self.owner_id.clone())),
            _ => self.payload.get(name).cloned(),
        }
    }
}

impl Keyed for Record {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Insert input for the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub owner_id: String,
    pub payload: Map<String, Value>,
}

impl NewRecord {
    pub fn new(owner_id: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            owner_id: owner_id.into(),
            payload,
        }
    }

    /// Serialize a typed payload into an insert.
    pub fn encode<T: Table>(owner_id: impl Into<String>, data: &T) -> Result<Self, SyncError> {
        Ok(Self::new(owner_id, to_patch(data)?))
    }
}

/// A typed row: the server columns plus a decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<T> {
    pub id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub data: T,
}

impl<T: Table> Row<T> {
    /// Decode a record's payload into `T`.
    pub fn decode(record: &Record) -> Result<Self, RemoteError> {
        let data = serde_json::from_value(Value::Object(record.payload.clone())).map_err(|e| {
            RemoteError::new(
                ErrorCode::Malformed,
                format!("{} row {}: {}", T::TABLE, record.id, e),
            )
        })?;
        Ok(Row {
            id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            created_at: record.created_at,
            data,
        })
    }

    /// Decode a batch of records, failing on the first malformed one.
    pub fn decode_all(records: &[Record]) -> Result<Vec<Self>, RemoteError> {
        records.iter().map(Self::decode).collect()
    }

    /// Encode back into an untyped record.
    pub fn encode(&self) -> Result<Record, SyncError> {
        Ok(Record {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            created_at: self.created_at,
            payload: to_patch(&self.data)?,
        })
    }
}

impl<T> Keyed for Row<T> {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Serialize any struct into a payload map suitable for insert or update.
///
/// Fields that are `None` and marked `skip_serializing_if = "Option::is_none"`
/// are left out, so partial update structs produce partial patches.
pub fn to_patch<P: Serialize + ?Sized>(value: &P) -> Result<Map<String, Value>, SyncError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => {
            if let Some(field) = RESERVED_FIELDS.iter().find(|f| map.contains_key(**f)) {
                return Err(SyncError::validation(format!(
                    "payload may not set server-owned field `{}`",
                    field
                )));
            }
            Ok(map)
        }
        Ok(other) => Err(SyncError::validation(format!(
            "payload must serialize to an object, got {}",
            other
        ))),
        Err(e) => Err(SyncError::validation(format!("payload serialization: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Table;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Table)]
    #[table(name = "notes")]
    struct Note {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pinned: Option<bool>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Table)]
    struct ProductImage {
        url: String,
    }

    fn record(payload: Value) -> Record {
        Record {
            id: "r-1".into(),
            owner_id: "owner-1".into(),
            created_at: Utc::now(),
            payload: payload.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn derive_uses_explicit_or_default_table_name() {
        assert_eq!(Note::TABLE, "notes");
        assert_eq!(ProductImage::TABLE, "product_images");
    }

    #[test]
    fn decode_typed_row() {
        let row = Row::<Note>::decode(&record(json!({ "text": "hello" }))).unwrap();
        assert_eq!(row.id, "r-1");
        assert_eq!(row.data.text, "hello");
        assert_eq!(row.data.pinned, None);
    }

    #[test]
    fn decode_malformed_row() {
        let err = Row::<Note>::decode(&record(json!({ "text": 42 }))).unwrap_err();
        assert_eq!(err.code, ErrorCode::Malformed);
    }

    #[test]
    fn record_field_lookup() {
        let rec = record(json!({ "text": "hello" }));
        assert_eq!(rec.field("id"), Some(json!("r-1")));
        assert_eq!(rec.field("owner_id"), Some(json!("owner-1")));
        assert_eq!(rec.field("text"), Some(json!("hello")));
        assert_eq!(rec.field("missing"), None);
    }

    #[test]
    fn patch_skips_absent_fields() {
        let patch = to_patch(&Note {
            text: "x".into(),
            pinned: None,
        })
        .unwrap();
        assert_eq!(patch.len(), 1);
        assert!(patch.contains_key("text"));
    }

    #[test]
    fn patch_rejects_non_objects_and_reserved_fields() {
        assert!(matches!(to_patch(&42), Err(SyncError::Validation(_))));
        assert!(matches!(
            to_patch(&json!({ "id": "forged" })),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn record_serializes_flat() {
        let rec = record(json!({ "text": "hello" }));
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["text"], json!("hello"));
        assert_eq!(value["id"], json!("r-1"));
        let back: Record = serde_json::from_value(value).unwrap();
        assert_eq!(back, rec);
    }
}
