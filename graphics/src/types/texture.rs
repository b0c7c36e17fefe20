//! Texture types and descriptors.

use std::fmt;
use std::str::FromStr;

use super::Extent3d;
use bitflags::bitflags;

/// Texture format enumeration.
///
/// Every format has a canonical text name (see [`TextureFormat::name`]) used
/// by frame graph descriptions, for example `RGBA8UNorm_sRGB` or
/// `D24UNormS8UInt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum TextureFormat {
    // 8-bit formats
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 8-bit red channel, signed normalized.
    R8Snorm,
    /// 8-bit red channel, unsigned integer.
    R8Uint,
    /// 8-bit red channel, signed integer.
    R8Sint,

    // 16-bit formats
    /// 16-bit red channel, unsigned normalized.
    R16Unorm,
    /// 16-bit red channel, float.
    R16Float,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,

    // 32-bit formats
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 16-bit RG channels, float.
    Rg16Float,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,
    /// 10-bit RGB with 2-bit alpha, unsigned normalized.
    Rgb10a2Unorm,
    /// Packed 11/11/10-bit float.
    Rg11b10Float,

    // 64-bit formats
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RG channels, float.
    Rg32Float,

    // 128-bit formats
    /// 32-bit RGBA channels, float.
    Rgba32Float,

    // Depth/stencil formats
    /// 16-bit depth.
    Depth16Unorm,
    /// 32-bit depth, float.
    Depth32Float,
    /// 8-bit stencil.
    Stencil8,
    /// 24-bit depth with 8-bit stencil.
    Depth24UnormStencil8,
    /// 32-bit depth float with 8-bit stencil.
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Every format, in declaration order.
    pub const ALL: [TextureFormat; 24] = [
        Self::R8Unorm,
        Self::R8Snorm,
        Self::R8Uint,
        Self::R8Sint,
        Self::R16Unorm,
        Self::R16Float,
        Self::Rg8Unorm,
        Self::R32Float,
        Self::R32Uint,
        Self::Rg16Float,
        Self::Rgba8Unorm,
        Self::Rgba8UnormSrgb,
        Self::Bgra8Unorm,
        Self::Bgra8UnormSrgb,
        Self::Rgb10a2Unorm,
        Self::Rg11b10Float,
        Self::Rgba16Float,
        Self::Rg32Float,
        Self::Rgba32Float,
        Self::Depth16Unorm,
        Self::Depth32Float,
        Self::Stencil8,
        Self::Depth24UnormStencil8,
        Self::Depth32FloatStencil8,
    ];

    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth32Float
                | Self::Stencil8
                | Self::Depth24UnormStencil8
                | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(
            self,
            Self::Stencil8 | Self::Depth24UnormStencil8 | Self::Depth32FloatStencil8
        )
    }

    /// Canonical name used in frame graph descriptions.
    pub fn name(&self) -> &'static str {
        match self {
            Self::R8Unorm => "R8UNorm",
            Self::R8Snorm => "R8SNorm",
            Self::R8Uint => "R8UInt",
            Self::R8Sint => "R8SInt",
            Self::R16Unorm => "R16UNorm",
            Self::R16Float => "R16Float",
            Self::Rg8Unorm => "RG8UNorm",
            Self::R32Float => "R32Float",
            Self::R32Uint => "R32UInt",
            Self::Rg16Float => "RG16Float",
            Self::Rgba8Unorm => "RGBA8UNorm",
            Self::Rgba8UnormSrgb => "RGBA8UNorm_sRGB",
            Self::Bgra8Unorm => "BGRA8UNorm",
            Self::Bgra8UnormSrgb => "BGRA8UNorm_sRGB",
            Self::Rgb10a2Unorm => "RGB10A2UNorm",
            Self::Rg11b10Float => "RG11B10Float",
            Self::Rgba16Float => "RGBA16Float",
            Self::Rg32Float => "RG32Float",
            Self::Rgba32Float => "RGBA32Float",
            Self::Depth16Unorm => "D16UNorm",
            Self::Depth32Float => "D32Float",
            Self::Stencil8 => "S8UInt",
            Self::Depth24UnormStencil8 => "D24UNormS8UInt",
            Self::Depth32FloatStencil8 => "D32FloatS8UInt",
        }
    }

    /// Stable numeric code, used when a format is stored in plain records.
    pub fn code(&self) -> u32 {
        *self as u32
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a format name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTextureFormat(pub String);

impl fmt::Display for UnknownTextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown texture format '{}'", self.0)
    }
}

impl std::error::Error for UnknownTextureFormat {}

impl FromStr for TextureFormat {
    type Err = UnknownTextureFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|format| format.name() == s)
            .ok_or_else(|| UnknownTextureFormat(s.to_string()))
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 0;
        /// Texture can be used as a storage texture.
        const STORAGE_BINDING = 1 << 1;
        /// Texture can be used as a color attachment.
        const COLOR_ATTACHMENT = 1 << 2;
        /// Texture can be used as a depth/stencil attachment.
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of the texture.
    pub size: Extent3d,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Sample count for multisampling.
    pub sample_count: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            mip_level_count: 1,
            sample_count: 1,
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether a texture created from `other` can stand in for one created
    /// from `self`. Labels are ignored.
    pub fn is_compatible(&self, other: &TextureDescriptor) -> bool {
        self.size == other.size
            && self.mip_level_count == other.mip_level_count
            && self.sample_count == other.sample_count
            && self.format == other.format
            && self.usage == other.usage
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::default(),
            mip_level_count: 1,
            sample_count: 1,
            format: TextureFormat::default(),
            usage: TextureUsage::empty(),
        }
    }
}
