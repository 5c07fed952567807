//! Data Models
//!
//! - [`Node`] / [`NewNode`] - the hierarchy entity, before and after its first save
//! - [`Interval`] - nested-set bounds
//! - [`ClosureRow`] - one tuple of the closure relation
//! - [`path`] - materialized path helpers
//! - [`NameValidator`] - attribute validation collaborator

mod closure;
mod node;
pub mod path;
mod validation;

pub use closure::ClosureRow;
pub use node::{Interval, NewNode, Node, NodeId, ValidationError};
pub use path::MalformedPath;
pub use validation::{NameValidator, DEFAULT_MAX_NAME_LENGTH};
