use thiserror::Error;

/// Core error type shared across pgharvest crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening a connection to a target or admin server failed.
    #[error("connection to {target} failed: {message}")]
    Connect { target: String, message: String },
    /// A read query against a target server failed.
    #[error("query failed: {0}")]
    Query(String),
    /// Writing a row into the admin database failed.
    #[error("insert failed: {0}")]
    Insert(String),
    /// Beginning, committing or rolling back an admin transaction failed.
    #[error("transaction failed: {0}")]
    Transaction(String),
    /// A connection attempt exceeded the configured timeout.
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Sending a notification failed.
    #[error("notification failed: {0}")]
    Notify(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results returned by pgharvest crates.
pub type Result<T> = std::result::Result<T, Error>;
