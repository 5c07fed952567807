//! Service Layer Error Types
//!
//! Operations report [`HierarchyError`](crate::engines::HierarchyError)
//! directly; this module only covers building a service from configuration.

use crate::config::ConfigError;
use crate::db::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceInitError {
    /// Configuration could not be loaded or failed validation
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The configured store could not be opened
    #[error("Failed to open store: {0}")]
    Store(#[from] StoreError),

    /// The configured backend is not compiled into this build
    #[error("Store backend '{0}' is not available in this build")]
    BackendUnavailable(&'static str),
}
