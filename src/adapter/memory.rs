//! Map-backed adapter implementing the same capabilities as the MongoDB one.
//!
//! Collections live in persistent maps (`im`), so a transaction snapshot is
//! a cheap clone of the whole store. Operations inside a transaction read
//! and write the snapshot. Commit publishes the collections the transaction
//! wrote, provided nobody else committed to them in the meantime. Rollback
//! drops the snapshot.
//!
//! Matching follows the store's equality rules closely enough for tests.
//! Dotted paths reach into embedded documents. Integers compare exactly,
//! and against a double only when the conversion is lossless. An array
//! field matches when any element equals the value.

use crate::core::record::{IDENTITY_FIELD, into_record, to_document};
use crate::core::{DbError, Result};
use crate::interface::{
    Collection, DatabaseConnection, DatabaseGetOne, DatabaseInsertOne, DatabaseTransaction,
    DatabaseUpdateOne, RecordKey,
};
use crate::transaction::{SessionSlot, TransactionId};
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

type Documents = im::Vector<Document>;
type Collections = im::HashMap<String, Documents>;
type Versions = im::HashMap<String, u64>;

#[derive(Debug, Clone, Default)]
struct StoreState {
    /// Per collection, bumped on every committed change
    versions: Versions,
    collections: Collections,
}

impl StoreState {
    fn version(&self, collection: &str) -> u64 {
        self.versions.get(collection).copied().unwrap_or(0)
    }

    fn bump(&mut self, collection: &str) {
        *self.versions.entry(collection.to_string()).or_insert(0) += 1;
    }
}

/// Shared storage behind one or more [`InMemoryAdapter`]s.
///
/// Cloning the store shares it, the way several clients share one server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed documents in a collection, identity included
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        let state = self.state.read().await;
        state
            .collections
            .get(collection)
            .map(|documents| documents.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.collections.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Transaction snapshot
#[derive(Debug)]
struct Snapshot {
    base_versions: Versions,
    collections: Collections,
    /// Collections the transaction has changed
    written: BTreeSet<String>,
}

impl Snapshot {
    /// First written collection that another writer has committed to since
    /// the snapshot was taken.
    fn conflict(&self, state: &StoreState) -> Option<&str> {
        self.written
            .iter()
            .find(|name| {
                self.base_versions.get(name.as_str()).copied().unwrap_or(0) != state.version(name)
            })
            .map(String::as_str)
    }
}

/// In-memory adapter
///
/// # Examples
///
/// ```
/// use mongo_adapter::{DatabaseConnection, DatabaseTransaction, InMemoryAdapter};
///
/// # #[tokio::main]
/// # async fn main() -> mongo_adapter::Result<()> {
/// let mut db = InMemoryAdapter::new();
/// db.connect().await?;
/// db.start_transaction().await?;
/// assert!(db.in_transaction());
/// db.rollback().await?;
/// assert!(!db.in_transaction());
/// db.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryAdapter {
    store: InMemoryStore,
    connected: bool,
    session: SessionSlot<Snapshot>,
}

impl InMemoryAdapter {
    /// Adapter over a fresh, private store
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter over a store shared with other adapters
    pub fn with_store(store: InMemoryStore) -> Self {
        Self {
            store,
            connected: false,
            session: SessionSlot::new(),
        }
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Id of the open transaction, if any
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.session.transaction_id()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DbError::NotConnected)
        }
    }

    async fn read<R>(&mut self, f: impl FnOnce(&Collections) -> R) -> Result<R> {
        self.ensure_connected()?;
        if let Some(snapshot) = self.session.handle_mut() {
            return Ok(f(&snapshot.collections));
        }
        let state = self.store.state.read().await;
        Ok(f(&state.collections))
    }

    /// Run a mutation of `collection`. `f` returns the result and whether
    /// anything changed.
    async fn write<R>(
        &mut self,
        collection: &str,
        f: impl FnOnce(&mut Collections) -> Result<(R, bool)>,
    ) -> Result<R> {
        self.ensure_connected()?;
        if let Some(snapshot) = self.session.handle_mut() {
            let (value, changed) = f(&mut snapshot.collections)?;
            if changed {
                snapshot.written.insert(collection.to_string());
            }
            return Ok(value);
        }
        let mut state = self.store.state.write().await;
        let (value, changed) = f(&mut state.collections)?;
        if changed {
            state.bump(collection);
        }
        Ok(value)
    }
}

#[async_trait]
impl DatabaseConnection for InMemoryAdapter {
    async fn connect(&mut self) -> Result<()> {
        if !self.connected {
            self.connected = true;
            info!("in-memory adapter connected");
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(active) = self.session.take() {
            warn!(transaction = %active.id(), "disconnecting with open transaction, rolled back");
        }
        if self.connected {
            self.connected = false;
            info!("in-memory adapter disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[async_trait]
impl DatabaseTransaction for InMemoryAdapter {
    async fn start_transaction(&mut self) -> Result<()> {
        self.session.ensure_vacant()?;
        self.ensure_connected()?;

        let snapshot = {
            let state = self.store.state.read().await;
            Snapshot {
                base_versions: state.versions.clone(),
                collections: state.collections.clone(),
                written: BTreeSet::new(),
            }
        };

        let id = self.session.install(snapshot)?;
        debug!(transaction = %id, "transaction started");
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        let active = self
            .session
            .active_mut()
            .ok_or(DbError::NoActiveTransaction)?;
        let id = active.id();

        if active.handle_mut().written.is_empty() {
            self.session.take();
            info!(transaction = %id, "read-only transaction committed");
            return Ok(());
        }

        let mut state = self.store.state.write().await;
        if let Some(collection) = active.handle_mut().conflict(&state) {
            // The session stays open; only rollback can end it now
            warn!(transaction = %id, collection, "write conflict, commit refused");
            return Err(DbError::WriteConflict(format!("{id} on {collection}")));
        }

        if let Some(active) = self.session.take() {
            let duration = active.duration();
            let snapshot = active.into_handle();
            for name in &snapshot.written {
                match snapshot.collections.get(name) {
                    Some(documents) => {
                        state.collections.insert(name.clone(), documents.clone());
                    }
                    None => {
                        state.collections.remove(name);
                    }
                }
                state.bump(name);
            }
            info!(transaction = %id, ?duration, "transaction committed");
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.session.take() {
            Some(active) => info!(transaction = %active.id(), "transaction rolled back"),
            None => debug!("rollback requested without an open transaction"),
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.session.is_active()
    }
}

#[async_trait]
impl DatabaseInsertOne for InMemoryAdapter {
    async fn insert_one<C: Collection>(
        &mut self,
        record: &C::Record,
    ) -> Result<Option<C::Record>> {
        let document = to_document(record)?;
        let stored = with_identity(document.clone());

        self.write(C::NAME, |collections| {
            let documents = collections
                .entry(C::NAME.to_string())
                .or_insert_with(Documents::new);
            let id = stored.get(IDENTITY_FIELD).cloned().unwrap_or(Bson::Null);
            if documents
                .iter()
                .any(|existing| existing.get(IDENTITY_FIELD) == Some(&id))
            {
                return Err(DbError::DuplicateKey(format!("{}: {id}", C::NAME)));
            }
            documents.push_back(stored);
            Ok(((), true))
        })
        .await?;

        debug!(collection = C::NAME, "inserted one");
        Ok(Some(into_record(document)?))
    }
}

#[async_trait]
impl DatabaseGetOne for InMemoryAdapter {
    async fn get_one<C: Collection>(&mut self, key: &C::Key) -> Result<Option<C::Record>> {
        let field = key.field().to_string();
        let value = key.value();

        let found = self
            .read(|collections| {
                collections.get(C::NAME).and_then(|documents| {
                    documents
                        .iter()
                        .find(|document| matches(document, &field, &value))
                        .cloned()
                })
            })
            .await?;

        debug!(collection = C::NAME, found = found.is_some(), "get one");
        found.map(into_record).transpose()
    }
}

#[async_trait]
impl DatabaseUpdateOne for InMemoryAdapter {
    async fn update_one<C: Collection>(
        &mut self,
        key: &C::Key,
        patch: &C::Patch,
    ) -> Result<Option<C::Record>> {
        let field = key.field().to_string();
        let value = key.value();
        let patch = to_document(patch)?;

        let updated = self
            .write(C::NAME, |collections| {
                let Some(documents) = collections.get_mut(C::NAME) else {
                    return Ok((None, false));
                };
                let Some(index) = documents
                    .iter()
                    .position(|document| matches(document, &field, &value))
                else {
                    return Ok((None, false));
                };

                let mut document = documents[index].clone();
                apply_set(&mut document, &patch)?;
                let changed = document != documents[index];
                if changed {
                    documents.set(index, document.clone());
                }
                Ok((Some(document), changed))
            })
            .await?;

        debug!(collection = C::NAME, found = updated.is_some(), "update one");
        updated.map(into_record).transpose()
    }
}

/// Put a generated identity first unless the record brings its own.
fn with_identity(document: Document) -> Document {
    if document.contains_key(IDENTITY_FIELD) {
        return document;
    }
    let mut stored = Document::new();
    stored.insert(IDENTITY_FIELD, ObjectId::new());
    for (key, value) in document {
        stored.insert(key, value);
    }
    stored
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn matches(document: &Document, field: &str, value: &Bson) -> bool {
    match lookup(document, field) {
        Some(Bson::Array(items)) if !matches!(value, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, value))
        }
        Some(found) => values_equal(found, value),
        None => matches!(value, Bson::Null),
    }
}

fn values_equal(left: &Bson, right: &Bson) -> bool {
    match (left, right) {
        (Bson::Double(l), Bson::Double(r)) => l == r || (l.is_nan() && r.is_nan()),
        (Bson::Double(d), other) | (other, Bson::Double(d)) => {
            as_integer(other).is_some_and(|i| integer_equals_double(i, *d))
        }
        _ => match (as_integer(left), as_integer(right)) {
            (Some(l), Some(r)) => l == r,
            _ => left == right,
        },
    }
}

fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

/// Equal only when the integer has an exact double representation.
fn integer_equals_double(integer: i64, double: f64) -> bool {
    let widened = integer as f64;
    widened == double && widened as i128 == i128::from(integer)
}

/// `$set` semantics: write each patch field, creating embedded documents
/// along dotted paths. The identity field cannot change.
fn apply_set(document: &mut Document, patch: &Document) -> Result<()> {
    for (path, value) in patch {
        if path == IDENTITY_FIELD {
            if document.get(IDENTITY_FIELD) != Some(value) {
                return Err(DbError::ImmutableField(IDENTITY_FIELD.to_string()));
            }
            continue;
        }
        set_path(document, path, value.clone())?;
    }
    Ok(())
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            match child {
                Bson::Document(inner) => set_path(inner, rest, value),
                _ => Err(DbError::InvalidUpdate(format!(
                    "cannot create field '{rest}' in non-document '{head}'"
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_with_identity_prepends_object_id() {
        let stored = with_identity(doc! { "foo": "foo" });
        let keys: Vec<&String> = stored.keys().collect();
        assert_eq!(keys, vec!["_id", "foo"]);
        assert!(stored.get_object_id("_id").is_ok());

        let own = with_identity(doc! { "_id": 7, "foo": "foo" });
        assert_eq!(own.get_i32("_id").unwrap(), 7);
    }

    #[test]
    fn test_matches_equality_rules() {
        let document = doc! {
            "name": "alice",
            "age": 30,
            "tags": ["a", "b"],
            "address": { "city": "Oslo" },
        };

        assert!(matches(&document, "name", &Bson::from("alice")));
        assert!(!matches(&document, "name", &Bson::from("bob")));
        assert!(matches(&document, "age", &Bson::Int64(30)));
        assert!(matches(&document, "age", &Bson::Double(30.0)));
        assert!(matches(&document, "tags", &Bson::from("b")));
        assert!(matches(&document, "address.city", &Bson::from("Oslo")));
        assert!(matches(&document, "missing", &Bson::Null));
        assert!(!matches(&document, "missing", &Bson::from("x")));
    }

    #[test]
    fn test_matches_large_integers_and_nan() {
        let document = doc! { "id": 9_007_199_254_740_992_i64, "ratio": f64::NAN };

        assert!(matches(&document, "id", &Bson::Int64(9_007_199_254_740_992)));
        assert!(!matches(&document, "id", &Bson::Int64(9_007_199_254_740_993)));
        assert!(matches(&document, "id", &Bson::Double(9_007_199_254_740_992.0)));

        let odd = doc! { "id": 9_007_199_254_740_993_i64 };
        assert!(!matches(&odd, "id", &Bson::Double(9_007_199_254_740_992.0)));

        let max = doc! { "id": i64::MAX };
        assert!(!matches(&max, "id", &Bson::Double(9_223_372_036_854_775_808.0)));

        assert!(matches(&document, "ratio", &Bson::Double(f64::NAN)));
        assert!(!matches(&document, "ratio", &Bson::Double(1.0)));
        assert!(!matches(&document, "id", &Bson::Double(0.5)));
    }

    #[test]
    fn test_apply_set_writes_only_patch_fields() {
        let mut document = doc! { "_id": 1, "foo": "foo", "bar": 2 };
        apply_set(&mut document, &doc! { "foo": "baz", "nested.deep": true }).unwrap();

        assert_eq!(document.get_str("foo").unwrap(), "baz");
        assert_eq!(document.get_i32("bar").unwrap(), 2);
        assert!(document.get_document("nested").unwrap().get_bool("deep").unwrap());
    }

    #[test]
    fn test_apply_set_rejects_identity_change() {
        let mut document = doc! { "_id": 1, "foo": "foo" };
        assert!(apply_set(&mut document, &doc! { "_id": 1 }).is_ok());

        let err = apply_set(&mut document, &doc! { "_id": 2 }).unwrap_err();
        assert!(matches!(err, DbError::ImmutableField(_)));
    }

    #[test]
    fn test_set_path_through_scalar_fails() {
        let mut document = doc! { "foo": "foo" };
        assert!(set_path(&mut document, "foo.bar", Bson::Null).is_err());
    }
}
