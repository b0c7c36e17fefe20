//! Render backend abstraction layer.
//!
//! The frame graph never talks to a graphics API directly. It asks a
//! [`RenderBackend`] for textures, render passes and frame buffers, and keeps
//! the returned handles.
//!
//! # Available Backends
//!
//! - [`DummyBackend`]: records every object in memory-manager backed pools
//!   without touching a GPU; used for testing and tooling.

pub mod dummy;
mod error;

pub use dummy::{
    DummyBackend, DummyBackendConfig, FrameBufferRecord, RenderPassRecord, TextureRecord,
};
pub use error::BackendError;

use crate::graph::{FrameBufferDescriptor, RenderPassDescriptor};
use crate::types::TextureDescriptor;

macro_rules! backend_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw backend index.
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            /// Raw backend index.
            pub fn index(&self) -> u32 {
                self.0
            }
        }
    };
}

backend_handle!(
    /// Handle to a backend texture.
    TextureHandle
);
backend_handle!(
    /// Handle to a backend render pass.
    RenderPassHandle
);
backend_handle!(
    /// Handle to a backend frame buffer.
    FrameBufferHandle
);

/// Creates and destroys the physical objects a compiled frame graph needs.
///
/// Handles are only meaningful to the backend that issued them.
pub trait RenderBackend {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Create a texture.
    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, BackendError>;

    /// Destroy a texture.
    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<(), BackendError>;

    /// Create a render pass.
    fn create_render_pass(
        &mut self,
        descriptor: &RenderPassDescriptor,
    ) -> Result<RenderPassHandle, BackendError>;

    /// Destroy a render pass.
    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) -> Result<(), BackendError>;

    /// Create a frame buffer.
    fn create_frame_buffer(
        &mut self,
        descriptor: &FrameBufferDescriptor,
    ) -> Result<FrameBufferHandle, BackendError>;

    /// Destroy a frame buffer.
    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle)
    -> Result<(), BackendError>;
}
