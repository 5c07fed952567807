//! Database Layer
//!
//! This module handles every interaction with the backing node store:
//!
//! - The [`NodeStore`] / [`StoreTransaction`] contract the engines consume
//! - The [`NodeFilter`] and [`ClosureFilter`] predicate languages
//! - An in-process [`MemoryStore`]
//! - A libsql-backed [`TursoStore`] (feature `turso`, on by default)
//!
//! # Architecture
//!
//! The store is the single source of truth. Engines keep nothing between
//! calls; every derived structure (closure rows, paths, intervals) is read and
//! rewritten inside one store transaction.

mod error;
mod memory_store;
pub mod node_store;
#[cfg(feature = "turso")]
mod turso_store;

pub use error::StoreError;
pub use memory_store::MemoryStore;
pub use node_store::{ClosureFilter, NodeFilter, NodeStore, StoreResult, StoreTransaction};
#[cfg(feature = "turso")]
pub use turso_store::TursoStore;
