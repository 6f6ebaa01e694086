//! Conversions between caller records and stored BSON documents.
//!
//! Records travel to the store as `Document`s. On the way back the
//! store-generated identity field is removed before the document is
//! deserialized into the caller's type, so record shapes never need to
//! declare `_id`.

use super::error::Result;
use crate::interface::RecordKey;
use mongodb::bson::{self, Document, doc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Store-generated identifier, never returned to callers.
pub const IDENTITY_FIELD: &str = "_id";

pub fn strip_identity(mut document: Document) -> Document {
    document.remove(IDENTITY_FIELD);
    document
}

pub fn to_document<T: Serialize>(record: &T) -> Result<Document> {
    Ok(bson::to_document(record)?)
}

pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T> {
    Ok(bson::from_document(document)?)
}

/// Strips the identity field and deserializes what is left.
pub fn into_record<T: DeserializeOwned>(document: Document) -> Result<T> {
    from_document(strip_identity(document))
}

/// Equality filter `{ <field>: <value> }` for a lookup key.
pub fn match_filter<K: RecordKey + ?Sized>(key: &K) -> Document {
    let mut filter = Document::new();
    filter.insert(key.field(), key.value());
    filter
}

/// Partial update: only the fields present in `patch` are written.
pub fn set_patch(patch: Document) -> Document {
    doc! { "$set": patch }
}
