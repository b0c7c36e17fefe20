//! # Ember Engine Core
//!
//! Core crate for Ember Engine memory management: a page-tracked memory
//! manager over a single relocatable heap, and fixed-size resource pools
//! built on top of it.

pub mod memory;
pub mod pool;

pub use memory::{MemoryConfig, MemoryError, MemoryManager, PageHandle};
pub use pool::{PoolHeader, ResourcePool};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the core crate version.
pub fn init() {
    log::info!("Ember Core v{} initialized", VERSION);
}
