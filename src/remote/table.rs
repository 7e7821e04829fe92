//! TableRepository - Typed accessor for one remote table.

use std::marker::PhantomData;

use serde::Serialize;
use serde_json::Value;

use super::{ErrorCode, Query, RemoteError, RemoteStore};
use crate::error::SyncError;
use crate::record::{to_patch, NewRecord, Row, Table, Versioned};

/// Typed repository wrapper for rows of a specific table.
///
/// Encodes payloads on the way in, decodes `Row<T>` on the way out, and
/// turns a missing row into `SyncError::NotFound` where the caller asked for
/// one that must exist.
pub struct TableRepository<'a, S: ?Sized, T> {
    store: &'a S,
    _marker: PhantomData<T>,
}

impl<'a, S: RemoteStore + ?Sized, T: Table> TableRepository<'a, S, T> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// All rows owned by `owner_id`, newest first.
    pub fn list(&self, owner_id: &str) -> Result<Vec<Row<T>>, SyncError> {
        let records = self.store.fetch_all(T::TABLE, owner_id)?;
        Ok(Row::decode_all(&records)?)
    }

    /// Rows passing `query`, newest first.
    pub fn select(&self, query: &Query) -> Result<Vec<Row<T>>, SyncError> {
        let records = self.store.select(T::TABLE, query)?;
        Ok(Row::decode_all(&records)?)
    }

    /// Get a row by id.
    pub fn get(&self, id: &str) -> Result<Option<Versioned<Row<T>>>, SyncError> {
        match self.store.get(T::TABLE, id)? {
            Some(versioned) => Ok(Some(Versioned {
                data: Row::decode(&versioned.data)?,
                version: versioned.version,
            })),
            None => Ok(None),
        }
    }

    /// Get a row that must exist.
    pub fn require(&self, id: &str) -> Result<Versioned<Row<T>>, SyncError> {
        self.get(id)?
            .ok_or_else(|| SyncError::not_found(T::TABLE, id))
    }

    /// Get a row that must exist and belong to `owner_id`. Someone else's
    /// row is reported as `NotFound`, same as a missing one.
    pub fn require_owned(&self, owner_id: &str, id: &str) -> Result<Versioned<Row<T>>, SyncError> {
        let row = self.require(id)?;
        if row.data.owner_id != owner_id {
            return Err(SyncError::not_found(T::TABLE, id));
        }
        Ok(row)
    }

    /// First row whose `field` equals `value`.
    pub fn find_one(
        &self,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Versioned<Row<T>>>, SyncError> {
        match self.store.find_one(T::TABLE, field, &value.into())? {
            Some(versioned) => Ok(Some(Versioned {
                data: Row::decode(&versioned.data)?,
                version: versioned.version,
            })),
            None => Ok(None),
        }
    }

    /// Insert a new row owned by `owner_id`.
    pub fn insert(&self, owner_id: &str, data: &T) -> Result<Row<T>, SyncError> {
        let record = self
            .store
            .insert(T::TABLE, NewRecord::encode(owner_id, data)?)?;
        Ok(Row::decode(&record)?)
    }

    /// Merge a partial update into an existing row.
    pub fn update<P: Serialize + ?Sized>(&self, id: &str, patch: &P) -> Result<Row<T>, SyncError> {
        let record = self
            .store
            .update(T::TABLE, id, to_patch(patch)?)
            .map_err(|e| missing_as_not_found::<T>(e, id))?;
        Ok(Row::decode(&record)?)
    }

    /// Merge a partial update if the row is still at `expected_version`.
    pub fn update_if<P: Serialize + ?Sized>(
        &self,
        id: &str,
        patch: &P,
        expected_version: u64,
    ) -> Result<Versioned<Row<T>>, SyncError> {
        let versioned = self
            .store
            .update_if(T::TABLE, id, to_patch(patch)?, expected_version)
            .map_err(|e| missing_as_not_found::<T>(e, id))?;
        Ok(Versioned {
            data: Row::decode(&versioned.data)?,
            version: versioned.version,
        })
    }

    /// Delete a row by id.
    pub fn delete(&self, id: &str) -> Result<(), SyncError> {
        Ok(self.store.delete(T::TABLE, id)?)
    }

    /// Delete every row whose `field` equals `value`.
    pub fn delete_where(&self, field: &str, value: impl Into<Value>) -> Result<usize, SyncError> {
        Ok(self.store.delete_where(T::TABLE, field, &value.into())?)
    }
}

fn missing_as_not_found<T: Table>(err: RemoteError, id: &str) -> SyncError {
    if err.code == ErrorCode::NoRows {
        SyncError::not_found(T::TABLE, id)
    } else {
        err.into()
    }
}

/// Extension trait for typed table access on any RemoteStore.
pub trait TablesExt: RemoteStore {
    /// Get a typed table repository.
    fn table<T: Table>(&self) -> TableRepository<'_, Self, T> {
        TableRepository::new(self)
    }
}

impl<S: RemoteStore + ?Sized> TablesExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemoteStore;
    use crate::Table;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Table)]
    #[table(name = "notes")]
    struct Note {
        text: String,
        done: bool,
    }

    #[derive(Serialize)]
    struct NotePatch {
        done: bool,
    }

    #[test]
    fn insert_and_list() {
        let store = InMemoryRemoteStore::new();
        let notes = store.table::<Note>();
        notes
            .insert(
                "alice",
                &Note {
                    text: "one".into(),
                    done: false,
                },
            )
            .unwrap();
        notes
            .insert(
                "alice",
                &Note {
                    text: "two".into(),
                    done: false,
                },
            )
            .unwrap();

        let listed = notes.list("alice").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].data.text, "two");
        assert!(notes.list("bob").unwrap().is_empty());
    }

    #[test]
    fn partial_update() {
        let store = InMemoryRemoteStore::new();
        let notes = store.table::<Note>();
        let row = notes
            .insert(
                "alice",
                &Note {
                    text: "one".into(),
                    done: false,
                },
            )
            .unwrap();

        let updated = notes.update(&row.id, &NotePatch { done: true }).unwrap();
        assert_eq!(updated.data.text, "one");
        assert!(updated.data.done);
    }

    #[test]
    fn require_missing_row_is_not_found() {
        let store = InMemoryRemoteStore::new();
        let err = store.table::<Note>().require("ghost").unwrap_err();
        assert_eq!(err, SyncError::not_found("notes", "ghost"));
    }

    #[test]
    fn foreign_rows_are_not_found() {
        let store = InMemoryRemoteStore::new();
        let notes = store.table::<Note>();
        let row = notes
            .insert(
                "alice",
                &Note {
                    text: "mine".into(),
                    done: false,
                },
            )
            .unwrap();

        assert_eq!(notes.require_owned("alice", &row.id).unwrap().data, row);
        assert_eq!(
            notes.require_owned("bob", &row.id).unwrap_err(),
            SyncError::not_found("notes", &row.id)
        );
    }

    #[test]
    fn update_missing_row_is_not_found() {
        let store = InMemoryRemoteStore::new();
        let err = store
            .table::<Note>()
            .update("ghost", &NotePatch { done: true })
            .unwrap_err();
        assert_eq!(err, SyncError::not_found("notes", "ghost"));
    }

    #[test]
    fn find_one_by_field() {
        let store = InMemoryRemoteStore::new();
        let notes = store.table::<Note>();
        notes
            .insert(
                "alice",
                &Note {
                    text: "needle".into(),
                    done: false,
                },
            )
            .unwrap();

        assert!(notes.find_one("text", "needle").unwrap().is_some());
        assert!(notes.find_one("text", "hay").unwrap().is_none());
    }
}
