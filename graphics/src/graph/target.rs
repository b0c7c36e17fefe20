//! Render pass and frame buffer configuration derived by the compiler.
//!
//! These descriptors are what the frame graph hands to a
//! [`RenderBackend`](crate::backend::RenderBackend) when it needs physical
//! render pass and frame buffer objects for a node.

use std::fmt;
use std::str::FromStr;

use crate::backend::{RenderPassHandle, TextureHandle};
use crate::types::TextureFormat;

/// Operation to perform when loading an attachment at the start of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum LoadOp {
    /// Clear the attachment.
    #[default]
    Clear,
    /// Load the existing contents of the attachment.
    Load,
}

impl LoadOp {
    /// Name used in frame graph descriptions.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clear => "LoadOpClear",
            Self::Load => "LoadOpLoad",
        }
    }
}

impl fmt::Display for LoadOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LoadOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LoadOpClear" => Ok(Self::Clear),
            "LoadOpLoad" => Ok(Self::Load),
            other => Err(other.to_string()),
        }
    }
}

/// Format and load operation of one attachment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDescriptor {
    /// Attachment format.
    pub format: TextureFormat,
    /// Operation when loading the attachment.
    pub load_op: LoadOp,
}

impl AttachmentDescriptor {
    /// Create an attachment descriptor.
    pub fn new(format: TextureFormat, load_op: LoadOp) -> Self {
        Self { format, load_op }
    }
}

/// Attachment layout of a render pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassDescriptor {
    /// Debug label, normally the node name.
    pub label: Option<String>,
    /// Color attachments in declaration order: outputs first, then inputs.
    pub color_attachments: Vec<AttachmentDescriptor>,
    /// The depth/stencil attachment, always cleared.
    pub depth_stencil_attachment: Option<AttachmentDescriptor>,
}

impl RenderPassDescriptor {
    /// Create an empty render pass descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Add a color attachment.
    pub fn with_color_attachment(mut self, attachment: AttachmentDescriptor) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    /// Set the depth/stencil attachment.
    pub fn with_depth_stencil(mut self, attachment: AttachmentDescriptor) -> Self {
        self.depth_stencil_attachment = Some(attachment);
        self
    }

    /// Number of attachments, depth included.
    pub fn attachment_count(&self) -> usize {
        self.color_attachments.len() + usize::from(self.depth_stencil_attachment.is_some())
    }
}

/// Textures bound to a render pass's attachment slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameBufferDescriptor {
    /// Debug label, normally the node name.
    pub label: Option<String>,
    /// Render pass the frame buffer is compatible with.
    pub render_pass: RenderPassHandle,
    /// Color attachment textures in render pass order.
    pub color_attachments: Vec<TextureHandle>,
    /// Depth/stencil texture.
    pub depth_stencil_attachment: Option<TextureHandle>,
    /// Width shared by every attachment.
    pub width: u32,
    /// Height shared by every attachment.
    pub height: u32,
}

impl FrameBufferDescriptor {
    /// Create a frame buffer descriptor without attachments.
    pub fn new(render_pass: RenderPassHandle, width: u32, height: u32) -> Self {
        Self {
            label: None,
            render_pass,
            color_attachments: Vec::new(),
            depth_stencil_attachment: None,
            width,
            height,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
