//! Memory manager error types.

use thiserror::Error;

/// Errors that can occur in memory manager, page heap and pool operations.
///
/// Contract violations (shrinking resize, malformed alignment, pool
/// underflow) are not represented here; they panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The memory manager has not been started, or has been shut down.
    #[error("memory manager is not active")]
    Inactive,

    /// `start_up` was called on a manager that is already active.
    #[error("memory manager is already active")]
    AlreadyActive,

    /// A fixed-capacity store cannot satisfy the request.
    #[error("{resource} capacity exceeded: requested {requested}, capacity {capacity}")]
    OutOfCapacity {
        /// Which store ran out ("page heap", "page table", "resource pool").
        resource: &'static str,
        /// Amount requested, in the store's unit (bytes or slots).
        requested: u64,
        /// Total capacity of the store, in the same unit.
        capacity: u64,
    },

    /// A handle whose page has been freed or flushed.
    #[error("stale page handle: index {index}, generation {generation}")]
    StaleHandle {
        /// Page table index encoded in the handle.
        index: u32,
        /// Generation encoded in the handle.
        generation: u32,
    },

    /// The system allocator refused to provide backing storage.
    #[error("system allocation of {bytes} bytes failed")]
    SystemAllocationFailed {
        /// Number of usable bytes requested.
        bytes: u64,
    },

    /// Page bytes cannot be viewed as the requested type.
    #[error("page of {size} bytes cannot be viewed as {type_name}")]
    Layout {
        /// Size of the page in bytes.
        size: u64,
        /// Name of the requested type.
        type_name: &'static str,
    },

    /// An argument is outside the range an operation accepts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration file could not be read or parsed.
    #[error("invalid memory configuration: {0}")]
    Config(String),
}
