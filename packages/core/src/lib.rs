//! Hierarchy Core
//!
//! A forest of named nodes kept under four interchangeable encodings:
//! adjacency list, closure table, materialized path and nested set. Each
//! encoding keeps its derived state consistent with the parent edges under
//! create, move and delete, answers ancestor/descendant queries natively, and
//! refuses any operation that would make a node its own ancestor.
//!
//! # Architecture
//!
//! - **Store as source of truth**: engines hold no state; every operation is
//!   one [`db::StoreTransaction`]
//! - **Closed set of engines**: [`engines::Engine`] is a tagged enum over the
//!   four encodings, all implementing [`engines::HierarchyEngine`]
//! - **libsql/Turso**: embedded SQLite-compatible backend next to an
//!   in-process store
//!
//! # Modules
//!
//! - [`models`] - Node, Interval, ClosureRow, path helpers, name validation
//! - [`db`] - Store contract and backends
//! - [`engines`] - The four hierarchy engines and the cycle guard
//! - [`services`] - HierarchyService and domain events
//! - [`config`] - Service configuration
//! - [`telemetry`] - Log subscriber setup

pub mod config;
pub mod db;
pub mod engines;
pub mod models;
pub mod services;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ConfigError, HierarchyConfig, StoreConfig};
pub use engines::{
    DeleteOutcome, Engine, HierarchyEngine, HierarchyError, HierarchyResult, MoveOutcome, Strategy,
};
pub use models::*;
pub use services::{HierarchyEvent, HierarchyService};
