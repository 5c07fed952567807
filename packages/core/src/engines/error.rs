//! Hierarchy Error Types
//!
//! Every engine reports failures through [`HierarchyError`]. None of these
//! are retried: they signal either bad input or a structural inconsistency
//! that a retry cannot fix.

use crate::db::StoreError;
use crate::models::{MalformedPath, NodeId, ValidationError};
use thiserror::Error;

pub type HierarchyResult<T> = Result<T, HierarchyError>;

/// Hierarchy operation errors
#[derive(Error, Debug)]
pub enum HierarchyError {
    /// Bad input, raised before any store mutation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The referenced parent does not resolve (or its derived ancestry is missing)
    #[error("Parent not found: {parent_id}")]
    ParentNotFound { parent_id: NodeId },

    /// The target node does not resolve
    #[error("Entity not found: {id}")]
    EntityNotFound { id: NodeId },

    /// Cycle guard trip or corrupted derived structure
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    /// Store operation failed
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}

impl HierarchyError {
    /// Create a parent not found error
    pub fn parent_not_found(parent_id: NodeId) -> Self {
        Self::ParentNotFound { parent_id }
    }

    /// Create an entity not found error
    pub fn entity_not_found(id: NodeId) -> Self {
        Self::EntityNotFound { id }
    }

    /// Create a data integrity error
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    pub fn is_data_integrity(&self) -> bool {
        matches!(self, Self::DataIntegrity(_))
    }
}

impl From<MalformedPath> for HierarchyError {
    fn from(err: MalformedPath) -> Self {
        Self::DataIntegrity(err.to_string())
    }
}
