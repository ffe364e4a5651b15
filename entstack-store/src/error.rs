//! Error types for the storage layer

use entstack_types::{ComponentId, DefId};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A component identifier (uri, id or hash) did not resolve
    #[error("Component def not found: {0}")]
    DefNotFound(String),

    /// A uri already maps to different content and shadowing is disabled
    #[error("Schema conflict: {uri} is already registered with different content (def {existing})")]
    SchemaConflict { uri: String, existing: DefId },

    /// A component references a def this store does not know
    #[error("Invalid component {id}: {message}")]
    InvalidComponent { id: ComponentId, message: String },

    /// Every id of the given kind is taken
    #[error("No free {0} ids left")]
    IdsExhausted(&'static str),

    /// A backend collaborator could not service the request
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Result type using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;
