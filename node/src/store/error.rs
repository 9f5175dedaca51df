use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("corrupt record at key {0}: {1}")]
    Corrupt(String, String),
}
