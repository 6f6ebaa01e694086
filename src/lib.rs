// ============================================================================
// mongo-adapter Library
// ============================================================================
//
// Collection-based CRUD and transaction contract, implemented over the
// MongoDB driver and over an in-memory store with the same behaviour.
//

pub mod adapter;
pub mod connection;
pub mod core;
pub mod interface;
pub mod transaction;

// Re-export main types for convenience
pub use adapter::{InMemoryAdapter, InMemoryStore, MongoDbAdapter};
pub use connection::AdapterConfig;
pub use crate::core::{DbError, IDENTITY_FIELD, Result};
pub use interface::{
    Collection, Database, DatabaseConnection, DatabaseGetOne, DatabaseInsertOne,
    DatabaseTransaction, DatabaseUpdateOne, FieldMatch, RecordKey,
};
pub use transaction::TransactionId;

/// BSON types used by records, keys and patches
pub use mongodb::bson;
