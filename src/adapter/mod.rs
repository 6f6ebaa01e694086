pub mod memory;
pub mod mongo;

pub use memory::{InMemoryAdapter, InMemoryStore};
pub use mongo::{DEFAULT_DATABASE, MongoDbAdapter};
