//! User render pass code attached to frame graph nodes.

use crate::backend::{FrameBufferHandle, RenderPassHandle, TextureHandle};

/// What a registered pass sees when the frame graph renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassContext<'a> {
    /// Node name.
    pub name: &'a str,
    /// Position of the node in the compiled order.
    pub order: usize,
    /// Render pass created for the node.
    pub render_pass: Option<RenderPassHandle>,
    /// Frame buffer created for the node.
    pub frame_buffer: Option<FrameBufferHandle>,
    /// Textures behind the node's texture-backed inputs, in declaration order.
    pub input_textures: Vec<TextureHandle>,
    /// Textures behind the node's texture-backed outputs, in declaration order.
    pub output_textures: Vec<TextureHandle>,
}

/// Rendering code for one frame graph node.
///
/// Registered with
/// [`FrameGraphBuilder::register_render_pass`](super::FrameGraphBuilder::register_render_pass)
/// and invoked by [`FrameGraph::render`](super::FrameGraph::render) in
/// compiled order.
pub trait FrameGraphRenderPass {
    /// Record the pass.
    fn render(&mut self, context: &PassContext<'_>);

    /// Called after every successful compile, in compiled order.
    fn on_compiled(&mut self, _context: &PassContext<'_>) {}
}

impl<F> FrameGraphRenderPass for F
where
    F: FnMut(&PassContext<'_>),
{
    fn render(&mut self, context: &PassContext<'_>) {
        self(context)
    }
}
