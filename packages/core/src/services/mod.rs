//! Business Services
//!
//! - [`HierarchyService`] - validation, engine dispatch and domain events
//! - [`HierarchyEvent`] - change notifications broadcast after commit
//!
//! Services sit between callers and the engines: attribute validation happens
//! here, before any engine opens a store transaction.

pub mod error;
pub mod events;
pub mod hierarchy_service;

pub use error::ServiceInitError;
pub use events::HierarchyEvent;
pub use hierarchy_service::HierarchyService;
