//! Texture and render-target descriptions shared by the resource manager
//! and render devices

/// Opaque handle to a texture owned by the `TextureManager`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u32);

impl TextureHandle {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Opaque handle to a render-target binding created by a `RenderDevice`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetHandle(pub u32);

/// Pixel formats used by probe cubemaps
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rg11b10Float,
}

impl PixelFormat {
    pub fn is_float(self) -> bool {
        matches!(self, PixelFormat::Rg11b10Float)
    }

    /// Probe storage format for the given HDR setting
    pub fn for_hdr(use_hdr: bool) -> Self {
        if use_hdr {
            PixelFormat::Rg11b10Float
        } else {
            PixelFormat::Rgba8Unorm
        }
    }
}

/// Sampling and allocation hints
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextureFlags {
    /// Clamp-to-edge addressing
    pub clamp: bool,
    /// Never sample below mip 0
    pub no_mipmaps: bool,
    pub high_quality: bool,
}

impl TextureFlags {
    pub const CLAMP: Self = Self {
        clamp: true,
        no_mipmaps: false,
        high_quality: true,
    };

    pub const CLAMP_NO_MIPMAPS: Self = Self {
        clamp: true,
        no_mipmaps: true,
        high_quality: true,
    };
}

/// Description of a square cubemap texture
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    /// Width and height of each face at mip 0
    pub size: u32,
    pub mip_levels: u32,
    pub format: PixelFormat,
    pub flags: TextureFlags,
}

impl TextureDesc {
    pub fn cubemap(size: u32, mip_levels: u32, format: PixelFormat, flags: TextureFlags) -> Self {
        Self {
            size,
            mip_levels,
            format,
            flags,
        }
    }

    /// Face size at the given mip level
    pub fn mip_size(&self, level: u32) -> u32 {
        (self.size >> level).max(1)
    }
}

/// ⌈log2(v)⌉ for v >= 1
pub fn ceil_log2(v: u32) -> u32 {
    debug_assert!(v > 0);
    u32::BITS - (v - 1).leading_zeros()
}

/// Number of mip levels in a full chain down to 1x1
pub fn full_mip_count(size: u32) -> u32 {
    ceil_log2(size) + 1
}

pub const CUBE_FACE_COUNT: usize = 6;

/// Cubemap faces in layer order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; CUBE_FACE_COUNT] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}
