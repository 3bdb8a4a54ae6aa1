use thiserror::Error;

/// Custom error type for commit log operations.
#[derive(Error, Debug)]
pub enum LogError {
    /// Boundary signal from the index: no such entry on read, no room on write.
    /// The segment consumes this as a rotation trigger, not a fault.
    #[error("end of file")]
    EndOfFile,

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec Error: {0}")]
    Codec(String),

    #[error("Corruption detected: {details}")]
    Corruption { details: String },

    #[error("Offset out of range: {offset}")]
    OffsetOutOfRange { offset: u64 },

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),
}

// Implement conversion from lock poison errors for convenience
impl<T> From<std::sync::PoisonError<T>> for LogError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        LogError::LockError(format!("Mutex/RwLock poisoned: {}", err))
    }
}
