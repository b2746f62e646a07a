//! Error types for Tessera.

use crate::value::Key;
use thiserror::Error;

/// Result type alias for Tessera operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tessera store operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A table's data creator rejected the input.
    #[error("validation failed in table {table}: {message}")]
    Validation { table: String, message: String },
    /// No key could be determined for a new record.
    #[error("cannot determine a key for a new record in table {table}: {message}")]
    Key { table: String, message: String },
    /// The key (or its whole table) is locked by another active transaction.
    #[error("key {key} in table {table} is locked by another transaction")]
    Lock { table: String, key: Key },
    /// Operation on a key that is not present.
    #[error("key {key} not found in table {table}")]
    NotFound { table: String, key: Key },
    /// Unknown or unresolvable join.
    #[error("join error: {message}")]
    Join { message: String },
    /// Query targets the wrong table or is malformed.
    #[error("query error: {message}")]
    Query { message: String },
    /// Raised by host code to abort the current transaction.
    #[error("transaction aborted: {message}")]
    Aborted { message: String },
}

impl Error {
    /// Creates a validation error.
    pub fn validation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a key error.
    pub fn key(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Key {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a lock error.
    pub fn lock(table: impl Into<String>, key: Key) -> Self {
        Error::Lock {
            table: table.into(),
            key,
        }
    }

    /// Creates a not found error.
    pub fn not_found(table: impl Into<String>, key: Key) -> Self {
        Error::NotFound {
            table: table.into(),
            key,
        }
    }

    /// Creates a join error.
    pub fn join(message: impl Into<String>) -> Self {
        Error::Join {
            message: message.into(),
        }
    }

    /// Creates a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Error::Query {
            message: message.into(),
        }
    }

    /// Creates an abort error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Error::Aborted {
            message: message.into(),
        }
    }

    /// Returns true for lock conflicts.
    pub fn is_lock(&self) -> bool {
        matches!(self, Error::Lock { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_error_display() {
        let err = Error::lock("users", Value::Int(3));
        assert!(err.to_string().contains("users"));
        assert!(err.to_string().contains('3'));

        let err = Error::not_found("addr", Value::from("x"));
        assert!(err.to_string().contains("not found"));

        let err = Error::aborted("boom");
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_error_constructors() {
        let err = Error::validation("users", "name is required");
        match err {
            Error::Validation { table, message } => {
                assert_eq!(table, "users");
                assert_eq!(message, "name is required");
            }
            _ => panic!("Wrong error type"),
        }
        assert!(Error::lock("t", Value::Int(1)).is_lock());
        assert!(!Error::join("bad").is_lock());
    }
}
