use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Raised by the MongoDB driver and passed through untouched.
    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] mongodb::bson::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] mongodb::bson::de::Error),

    #[error("Not connected: call connect() first")]
    NotConnected,

    #[error("Transaction already active ({0})")]
    TransactionAlreadyActive(String),

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Field '{0}' is immutable")]
    ImmutableField(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Write conflict, transaction {0} aborted")]
    WriteConflict(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// True when the error came from the driver rather than the adapter itself.
    pub fn is_driver_error(&self) -> bool {
        matches!(self, DbError::Driver(_))
    }
}
