//! Resources flowing between frame graph nodes.

use std::fmt;
use std::str::FromStr;

use crate::backend::TextureHandle;
use crate::types::TextureFormat;

use super::node::NodeHandle;
use super::target::LoadOp;

/// Handle to a resource record in a [`FrameGraphBuilder`](super::FrameGraphBuilder).
///
/// Only valid within the builder that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(u32);

impl ResourceHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Index into the builder's resource list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of data a resource carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// GPU buffer.
    Buffer,
    /// Sampled or storage texture.
    Texture,
    /// Render target bound to a frame buffer.
    Attachment,
    /// Pure ordering token with no backing memory.
    Reference,
}

impl ResourceType {
    /// Name used in frame graph descriptions.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Texture => "texture",
            Self::Attachment => "attachment",
            Self::Reference => "reference",
        }
    }

    /// Whether resources of this type are backed by a texture.
    pub fn is_texture_backed(&self) -> bool {
        matches!(self, Self::Texture | Self::Attachment)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buffer" => Ok(Self::Buffer),
            "texture" => Ok(Self::Texture),
            "attachment" => Ok(Self::Attachment),
            "reference" => Ok(Self::Reference),
            other => Err(other.to_string()),
        }
    }
}

/// Buffer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferInfo {
    /// Size in bytes.
    pub size: u64,
}

/// Texture parameters, plus the texture assigned during compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels, always 1 for parsed resources.
    pub depth: u32,
    /// Pixel format.
    pub format: TextureFormat,
    /// Load operation when the producing node writes it.
    pub load_op: LoadOp,
    /// Texture aliased to this resource; set while the resource is allocated.
    pub texture: Option<TextureHandle>,
}

impl TextureInfo {
    /// A 2D texture without an assigned texture.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, load_op: LoadOp) -> Self {
        Self {
            width,
            height,
            depth: 1,
            format,
            load_op,
            texture: None,
        }
    }
}

/// Type-specific resource parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceInfo {
    /// Buffer parameters.
    Buffer(BufferInfo),
    /// Texture or attachment parameters.
    Texture(TextureInfo),
}

/// One resource record.
///
/// Outputs are canonical records: `producer` is the node that writes them and
/// `output` points at the record itself. Inputs start as placeholders and
/// receive `producer`, `info` and `output` from the matching output when
/// edges are computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameGraphResource {
    /// Resource name, shared by an output and the inputs that read it.
    pub name: String,
    /// Declared type.
    pub ty: ResourceType,
    /// Parameters, known for outputs and for resolved inputs.
    pub info: Option<ResourceInfo>,
    /// Node that produces the resource.
    pub producer: Option<NodeHandle>,
    /// Canonical output record.
    pub output: Option<ResourceHandle>,
    /// Number of enabled consumers still to run; maintained during compile.
    pub reference_count: i32,
    /// Provided from outside the graph; never looked up or counted.
    pub external: bool,
}

impl FrameGraphResource {
    /// Texture parameters, if any.
    pub fn texture_info(&self) -> Option<&TextureInfo> {
        match &self.info {
            Some(ResourceInfo::Texture(info)) => Some(info),
            _ => None,
        }
    }

    /// Mutable texture parameters, if any.
    pub fn texture_info_mut(&mut self) -> Option<&mut TextureInfo> {
        match &mut self.info {
            Some(ResourceInfo::Texture(info)) => Some(info),
            _ => None,
        }
    }

    /// Texture currently aliased to the resource.
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture_info().and_then(|info| info.texture)
    }
}
