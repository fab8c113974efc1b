//! Error types for the serving engine.
//!
//! Every public operation returns [`ServingResult`]. The variants are
//! categorical: callers branch on the kind, the payload is for humans.

use thiserror::Error;

/// Result type alias for serving operations.
pub type ServingResult<T> = Result<T, ServingError>;

/// Errors surfaced by the serving engine and its building blocks.
#[derive(Debug, Error)]
pub enum ServingError {
    /// No generation is installed yet.
    #[error("No model generation is available yet")]
    NotReady,

    /// None of the requested users are known.
    #[error("No such user: {0}")]
    NoSuchUser(String),

    /// None of the requested items are known.
    #[error("No such item: {0}")]
    NoSuchItem(String),

    /// The deployment disabled a capability the operation needs.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Caller supplied an unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A computed score or delta was non-finite where it must not be.
    #[error("Model corruption: {0}")]
    ModelCorruption(String),

    /// A key collided with one of the reserved container sentinels.
    #[error("Key {0} is reserved and cannot be stored")]
    InvalidKey(i64),

    /// Configuration or snapshot could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServingError {
    pub fn no_such_user(id: impl Into<String>) -> Self {
        Self::NoSuchUser(id.into())
    }

    pub fn no_such_item(id: impl Into<String>) -> Self {
        Self::NoSuchItem(id.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::ModelCorruption(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Only `NotReady` goes away by itself; everything else needs a different request.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotReady)
    }
}

impl From<serde_json::Error> for ServingError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_recoverable() {
        let err = ServingError::no_such_user("alice");
        assert_eq!(err.to_string(), "No such user: alice");
        assert!(!err.is_recoverable());
        assert!(ServingError::NotReady.is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ServingError = io.into();
        assert!(matches!(err, ServingError::Io(_)));
    }
}
