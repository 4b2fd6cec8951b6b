//! The pixel formats an atlas's backing resource can be created with.
//!
//! A format mostly matters to the atlas for byte-size accounting: together
//! with the extent and mip count it determines the size of the backing
//! resource reported by the usage stats. Uploading and sampling texel data is
//! the caller's business.
//!
//! # Block-compressed formats
//!
//! A block-compressed format encodes a whole block of texels into a fixed
//! number of bytes, so sizes are computed in whole blocks rather than single
//! texels. An atlas using one of these formats should be configured with a
//! minimum alignment that is a multiple of the block extent, so that regions
//! never straddle a block boundary.

use crate::DeviceSize;

/// Describes the texel data of the atlas's backing resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Format {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    R16Sfloat,
    Rg16Sfloat,
    Rgba16Sfloat,
    R32Sfloat,
    Rg32Sfloat,
    Rgba32Sfloat,
    /// BC1 block compression, 8 bytes per 4x4 block, 1-bit alpha.
    Bc1RgbaUnorm,
    /// BC1 block compression with sRGB-encoded color.
    Bc1RgbaSrgb,
    /// BC3 block compression, 16 bytes per 4x4 block, interpolated alpha.
    Bc3RgbaUnorm,
    /// BC3 block compression with sRGB-encoded color.
    Bc3RgbaSrgb,
    /// BC7 block compression, 16 bytes per 4x4 block.
    Bc7RgbaUnorm,
}

impl Format {
    /// Returns the extent in texels of a single texel block.
    ///
    /// Uncompressed formats have a block extent of `[1, 1]`.
    #[inline]
    pub const fn block_extent(self) -> [u32; 2] {
        match self {
            Format::Bc1RgbaUnorm
            | Format::Bc1RgbaSrgb
            | Format::Bc3RgbaUnorm
            | Format::Bc3RgbaSrgb
            | Format::Bc7RgbaUnorm => [4, 4],
            _ => [1, 1],
        }
    }

    /// Returns the size in bytes of a single texel block.
    ///
    /// For uncompressed formats this is the size of a single texel.
    #[inline]
    pub const fn block_size(self) -> DeviceSize {
        match self {
            Format::R8Unorm => 1,
            Format::Rg8Unorm | Format::R16Sfloat => 2,
            Format::Rgba8Unorm
            | Format::Rgba8Srgb
            | Format::Bgra8Unorm
            | Format::Bgra8Srgb
            | Format::Rg16Sfloat
            | Format::R32Sfloat => 4,
            Format::Rgba16Sfloat
            | Format::Rg32Sfloat
            | Format::Bc1RgbaUnorm
            | Format::Bc1RgbaSrgb => 8,
            Format::Rgba32Sfloat
            | Format::Bc3RgbaUnorm
            | Format::Bc3RgbaSrgb
            | Format::Bc7RgbaUnorm => 16,
        }
    }

    /// Returns whether the format encodes texels in compressed blocks.
    #[inline]
    pub const fn is_compressed(self) -> bool {
        self.block_extent()[0] != 1
    }
}
