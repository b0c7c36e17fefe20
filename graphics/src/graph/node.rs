//! Frame graph nodes and the records used to create them.

use crate::backend::{FrameBufferHandle, RenderPassHandle};
use crate::types::TextureFormat;

use super::resource::{BufferInfo, ResourceHandle, ResourceInfo, ResourceType, TextureInfo};
use super::target::LoadOp;

/// Handle to a node in a [`FrameGraphBuilder`](super::FrameGraphBuilder).
///
/// `NodeHandle` is `Copy` and cheap to pass around. It is only valid within
/// the builder that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

impl NodeHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Index into the builder's node list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One pass of the frame graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameGraphNode {
    /// Unique node name.
    pub name: String,
    /// Disabled nodes are skipped by compile and render.
    pub enabled: bool,
    /// Input resource records, in declaration order.
    pub inputs: Vec<ResourceHandle>,
    /// Output resource records, in declaration order.
    pub outputs: Vec<ResourceHandle>,
    /// Nodes that consume one of this node's outputs.
    pub edges: Vec<NodeHandle>,
    /// Render pass created for the node.
    pub render_pass: Option<RenderPassHandle>,
    /// Frame buffer created for the node.
    pub frame_buffer: Option<FrameBufferHandle>,
}

/// Declaration of a node input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputCreation {
    /// Name of the resource read.
    pub name: String,
    /// Declared type.
    pub ty: ResourceType,
    /// Provided from outside the graph.
    pub external: bool,
}

impl InputCreation {
    /// An input produced by another node.
    pub fn new(name: impl Into<String>, ty: ResourceType) -> Self {
        Self {
            name: name.into(),
            ty,
            external: false,
        }
    }

    /// Mark the input as provided from outside the graph.
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }
}

/// Declaration of a node output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCreation {
    /// Name of the resource written.
    pub name: String,
    /// Declared type.
    pub ty: ResourceType,
    /// Parameters; required for texture-backed outputs.
    pub info: Option<ResourceInfo>,
}

impl OutputCreation {
    /// An attachment output.
    pub fn attachment(
        name: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
        load_op: LoadOp,
    ) -> Self {
        Self {
            name: name.into(),
            ty: ResourceType::Attachment,
            info: Some(ResourceInfo::Texture(TextureInfo::new_2d(
                width, height, format, load_op,
            ))),
        }
    }

    /// A texture output.
    pub fn texture(
        name: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
        load_op: LoadOp,
    ) -> Self {
        Self {
            ty: ResourceType::Texture,
            ..Self::attachment(name, width, height, format, load_op)
        }
    }

    /// A buffer output.
    pub fn buffer(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            ty: ResourceType::Buffer,
            info: Some(ResourceInfo::Buffer(BufferInfo { size })),
        }
    }

    /// A reference output, used only to order nodes.
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ResourceType::Reference,
            info: None,
        }
    }
}

/// Declaration of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCreation {
    /// Unique node name.
    pub name: String,
    /// Whether the node takes part in compile.
    pub enabled: bool,
    /// Inputs in declaration order.
    pub inputs: Vec<InputCreation>,
    /// Outputs in declaration order.
    pub outputs: Vec<OutputCreation>,
}

impl NodeCreation {
    /// An enabled node with no inputs or outputs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Set whether the node is enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add an input.
    pub fn with_input(mut self, input: InputCreation) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add an output.
    pub fn with_output(mut self, output: OutputCreation) -> Self {
        self.outputs.push(output);
        self
    }
}
