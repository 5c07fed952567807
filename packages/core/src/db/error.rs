//! Store Error Types
//!
//! This module defines error types for node store operations, providing
//! clear error handling for connection, constraint, and query failures.

use std::path::PathBuf;
use thiserror::Error;

/// Node store errors
///
/// Covers every failure a backend can report. Hierarchy rule violations are
/// not store errors; engines raise those as `HierarchyError`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open or connect to the backing database
    #[error("Failed to connect to store at {path}: {reason}")]
    ConnectionFailed { path: PathBuf, reason: String },

    /// Failed to initialize the store schema
    #[error("Failed to initialize store schema: {0}")]
    InitializationFailed(String),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecution { context: String },

    /// Unique key or reference constraint violated
    #[error("Constraint violated: {context}")]
    Constraint { context: String },

    /// A stored row could not be converted into a model
    #[error("Failed to decode stored row: {context}")]
    Decode { context: String },

    /// Operation attempted on a transaction that already committed or rolled back
    #[error("Transaction already finished")]
    TransactionClosed,

    /// libsql operation error
    #[cfg(feature = "turso")]
    #[error("Database operation failed: {0}")]
    Libsql(#[from] libsql::Error),
}

impl StoreError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            path,
            reason: reason.into(),
        }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecution {
            context: context.into(),
        }
    }

    /// Create a constraint violation error
    pub fn constraint(context: impl Into<String>) -> Self {
        Self::Constraint {
            context: context.into(),
        }
    }

    /// Create a decode error
    pub fn decode(context: impl Into<String>) -> Self {
        Self::Decode {
            context: context.into(),
        }
    }
}
