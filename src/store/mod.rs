//! The atomic document store that leasehold coordinates through.
//!
//! Everything the lock and queue protocols need is expressed as one call on a
//! [`Collection`]: a filter, an update, a rule for choosing among several
//! matching documents, and an optional document to insert when nothing
//! matches. A backend must apply each call atomically with respect to every
//! other call on the same collection. Nothing above this layer takes a lock.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryStore`]: collections inside the current process.
//! - [`FileStore`]: a directory per collection, shared between processes via
//!   an exclusive OS file lock held for the duration of each call.
//!
//! # Documents
//!
//! Documents are JSON objects keyed by a string `_id`. Timestamps are stored as
//! integer microseconds since the Unix epoch so that filters can compare them
//! numerically (see [`timestamp_value`]).

mod file;
mod filter;
mod memory;
mod selection;
mod update;


pub use file::{FileCollection, FileStore, FileStoreOptions, GuardMetadata};
pub use filter::{Filter, Operand};
pub use memory::{MemoryCollection, MemoryStore};
pub use selection::{Point, Selection};
pub use update::Update;

use crate::error::{LeaseholdError, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A stored document.
pub type Document = Map<String, Value>;

/// Name of the unique key field.
pub const ID_FIELD: &str = "_id";

/// Index declarations a collection understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSpec {
    /// Flat 2-D index over a `[x, y]` field, required by [`Selection::Nearest`].
    Geo2d(String),
}

/// A named set of documents with atomic single-call mutation.
pub trait Collection: Send + Sync + std::fmt::Debug {
    /// Collection name, used in errors and logs.
    fn name(&self) -> &str;

    /// The store's own clock. Filters using [`Operand::Now`] and updates built
    /// with [`Update::set_expiry`] are evaluated against this.
    fn now(&self) -> DateTime<Utc>;

    /// Declare an index. Idempotent.
    fn ensure_index(&self, index: IndexSpec) -> Result<()>;

    /// Insert a new document.
    ///
    /// Fails with [`LeaseholdError::DuplicateKey`] if the `_id` already exists.
    fn insert_one(&self, doc: Document) -> Result<()>;

    /// Atomically update one matching document, or insert `upsert` on a miss.
    ///
    /// Among the documents matching `filter`, `selection` picks one; `update`
    /// is applied to it and the new state is returned. If nothing matches and
    /// `upsert` is given, `update` is applied to `upsert` and the result is
    /// inserted, which fails with [`LeaseholdError::DuplicateKey`] when a
    /// non-matching document already owns that `_id`. Returns `Ok(None)` on a
    /// miss without `upsert`.
    fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        selection: &Selection,
        upsert: Option<Document>,
    ) -> Result<Option<Document>>;

    /// Delete every matching document and return how many were removed.
    fn delete_many(&self, filter: &Filter) -> Result<u64>;

    /// Read every matching document, ordered by `_id`.
    fn find(&self, filter: &Filter) -> Result<Vec<Document>>;
}

/// A source of collections sharing one connection.
pub trait Store: Send + Sync {
    fn collection(&self, name: &str) -> Result<Arc<dyn Collection>>;
}

/// Encode a timestamp the way documents persist it.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::from(at.timestamp_micros())
}

/// Read the `_id` of a document.
pub fn document_id<'a>(collection: &str, doc: &'a Document) -> Result<&'a str> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| LeaseholdError::Corrupt {
            collection: collection.to_string(),
            message: "document has no string _id".to_string(),
        })
}

/// Convert a document into a typed entity.
pub fn decode<T: serde::de::DeserializeOwned>(collection: &str, doc: Document) -> Result<T> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| LeaseholdError::Corrupt {
        collection: collection.to_string(),
        message: e.to_string(),
    })
}

/// Convert a typed entity into a document.
pub fn encode<T: serde::Serialize>(collection: &str, entity: &T) -> Result<Document> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(other) => Err(LeaseholdError::Store(format!(
            "entity for '{}' encoded as {} instead of an object",
            collection, other
        ))),
        Err(e) => Err(LeaseholdError::Store(format!(
            "failed to encode entity for '{}': {}",
            collection, e
        ))),
    }
}

/// The shared body of `find_one_and_update` for backends that can see every
/// candidate at once while holding their collection lock.
///
/// Returns the index of the chosen candidate, or `None` on a miss.
pub(crate) fn choose_target(
    collection: &str,
    candidates: &[&Document],
    filter: &Filter,
    selection: &Selection,
    now: DateTime<Utc>,
    has_geo_index: impl Fn(&str) -> bool,
) -> Result<Option<usize>> {
    if let Some(field) = selection.index_field()
        && !has_geo_index(field)
    {
        return Err(LeaseholdError::MissingIndex {
            collection: collection.to_string(),
            field: field.to_string(),
        });
    }

    let matching: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, doc)| filter.matches(doc, now))
        .map(|(i, _)| i)
        .collect();

    let chosen = selection.choose(matching.iter().map(|&i| candidates[i]));
    Ok(chosen.map(|pos| matching[pos]))
}

/// Build the document an upsert inserts: `upsert` with `update` applied.
pub(crate) fn prepare_upsert(
    collection: &str,
    mut upsert: Document,
    update: &Update,
    now: DateTime<Utc>,
) -> Result<(String, Document)> {
    update.apply(collection, &mut upsert, now)?;
    let id = document_id(collection, &upsert)?.to_string();
    Ok((id, upsert))
}
