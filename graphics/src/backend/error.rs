//! Backend error types.

use ember_core::memory::MemoryError;
use thiserror::Error;

/// Errors that can occur in backend operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A handle that does not refer to a live object.
    #[error("invalid {kind} handle {index}")]
    InvalidHandle {
        /// Object kind ("texture", "render pass", "frame buffer").
        kind: &'static str,
        /// Raw handle value.
        index: u32,
    },
    /// Bookkeeping storage failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}
