//! # Ember Graphics
//!
//! Frame graph compiler for the Ember engine.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`FrameGraph`] - Declarative description of render passes and the
//!   resources flowing between them
//! - [`compiler`] - Pass ordering, lifetime analysis and texture aliasing
//! - [`RenderBackend`] - Trait for the graphics API collaborator
//! - [`DummyBackend`] - Backend that records objects in memory-manager pools,
//!   for testing and tooling
//!
//! ## Example
//!
//! ```
//! use ember_graphics::{DummyBackend, DummyBackendConfig, FrameGraph};
//!
//! let mut backend = DummyBackend::new(DummyBackendConfig::default())?;
//! let mut graph = FrameGraph::from_json(r#"{ "name": "empty", "passes": [ { "name": "present" } ] }"#)?;
//! graph.compile(&mut backend)?;
//! graph.shutdown(&mut backend)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod compiler;
pub mod graph;
pub mod types;

// Re-export main types for convenience
pub use backend::{
    BackendError, DummyBackend, DummyBackendConfig, FrameBufferHandle, RenderBackend,
    RenderPassHandle, TextureHandle,
};
pub use compiler::CompileReport;
pub use graph::{
    CompileError, FrameGraph, FrameGraphBuilder, FrameGraphDescription, FrameGraphRenderPass,
    GraphError, LoadOp, NodeCreation, NodeHandle, ParseError, PassContext, ResourceHandle,
    ResourceType,
};
pub use types::{Extent3d, TextureDescriptor, TextureFormat, TextureUsage};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
pub fn init() {
    log::info!("Ember Graphics v{} initialized", VERSION);
}
