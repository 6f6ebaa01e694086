use crate::core::Result;
use async_trait::async_trait;
use mongodb::bson::Bson;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Maps a collection name to the shapes of the records stored in it.
///
/// Implemented by a marker type per collection. Capability methods are
/// generic over `C: Collection`, so a call can only pass the record, patch
/// and lookup key declared for that collection.
///
/// # Examples
///
/// ```
/// use mongo_adapter::{Collection, RecordKey};
/// use mongo_adapter::bson::Bson;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Foo {
///     id: String,
///     foo: String,
/// }
///
/// #[derive(Serialize)]
/// struct FooPatch {
///     #[serde(skip_serializing_if = "Option::is_none")]
///     foo: Option<String>,
/// }
///
/// enum FooKey {
///     Id(String),
///     Foo(String),
/// }
///
/// impl RecordKey for FooKey {
///     fn field(&self) -> &str {
///         match self {
///             FooKey::Id(_) => "id",
///             FooKey::Foo(_) => "foo",
///         }
///     }
///
///     fn value(&self) -> Bson {
///         match self {
///             FooKey::Id(v) | FooKey::Foo(v) => Bson::String(v.clone()),
///         }
///     }
/// }
///
/// struct FooCollection;
///
/// impl Collection for FooCollection {
///     const NAME: &'static str = "fooCollection";
///     type Record = Foo;
///     type Patch = FooPatch;
///     type Key = FooKey;
/// }
/// ```
pub trait Collection: Send + Sync + 'static {
    /// Name of the collection in the store.
    const NAME: &'static str;

    /// Complete record shape, as stored and returned.
    type Record: Serialize + DeserializeOwned + Send + Sync;

    /// Partial shape accepted by `update_one`. Fields that serialize are
    /// written, so optional fields should skip serializing when `None`.
    type Patch: Serialize + Send + Sync;

    /// Field/value pair that can be used to look a record up.
    type Key: RecordKey + Send + Sync;
}

/// A lookup by one field of a record: `field == value`.
pub trait RecordKey {
    fn field(&self) -> &str;
    fn value(&self) -> Bson;
}

/// Untyped lookup key for collections whose records are plain documents.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    field: String,
    value: Bson,
}

impl FieldMatch {
    pub fn new(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl RecordKey for FieldMatch {
    fn field(&self) -> &str {
        &self.field
    }

    fn value(&self) -> Bson {
        self.value.clone()
    }
}

/// Connection lifecycle of an adapter.
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    /// Open the connection. Calling it while connected is a no-op.
    async fn connect(&mut self) -> Result<()>;

    /// Close the connection. Safe to call when already disconnected.
    async fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// Transaction control. At most one transaction is open per adapter.
#[async_trait]
pub trait DatabaseTransaction: Send + Sync {
    /// Create a session if none exists and begin a transaction on it.
    async fn start_transaction(&mut self) -> Result<()>;

    /// Commit the open transaction and discard its session.
    async fn commit_transaction(&mut self) -> Result<()>;

    /// Abort the open transaction and discard its session.
    async fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;
}

#[async_trait]
pub trait DatabaseInsertOne: Send + Sync {
    /// Insert `record` into `C::NAME`, inside the open transaction if any.
    ///
    /// Returns the record as stored, without the identity field.
    async fn insert_one<C: Collection>(&mut self, record: &C::Record) -> Result<Option<C::Record>>;
}

#[async_trait]
pub trait DatabaseGetOne: Send + Sync {
    /// First record of `C::NAME` matching `key`, or `None`.
    async fn get_one<C: Collection>(&mut self, key: &C::Key) -> Result<Option<C::Record>>;
}

#[async_trait]
pub trait DatabaseUpdateOne: Send + Sync {
    /// Apply `patch` to the first record matching `key`.
    ///
    /// Returns the record after the update, or `None` when nothing matched.
    async fn update_one<C: Collection>(
        &mut self,
        key: &C::Key,
        patch: &C::Patch,
    ) -> Result<Option<C::Record>>;
}

/// Every capability at once, for code that drives a whole unit of work.
pub trait Database:
    DatabaseConnection
    + DatabaseTransaction
    + DatabaseInsertOne
    + DatabaseGetOne
    + DatabaseUpdateOne
{
}

impl<T> Database for T where
    T: DatabaseConnection
        + DatabaseTransaction
        + DatabaseInsertOne
        + DatabaseGetOne
        + DatabaseUpdateOne
{
}
