pub mod error;
pub mod record;

pub use error::{DbError, Result};
pub use record::{IDENTITY_FIELD, into_record, strip_identity};
