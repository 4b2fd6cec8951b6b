//! The logical shape of an atlas's backing image resource.

use crate::{format::Format, DeviceSize};
use std::cmp::max;

/// The dimensionality of the backing resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageDimension {
    /// A plain 2D image. The atlas is limited to a single slice and never
    /// grows in layer count.
    Dim2d,

    /// A 2D array image. The atlas can grow up to its configured layer cap.
    Dim2dArray,
}

/// The logical shape of the resource backing a texture atlas.
///
/// The extent, mip count, format and dimensionality are fixed at atlas
/// construction; the layer count grows monotonically over the atlas's
/// lifetime. Snapshots returned by the atlas carry the backing resource's
/// current layer count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtlasDescriptor {
    /// A name used in log messages and diagnostics.
    pub name: String,

    /// The dimensionality of the backing resource.
    pub dimension: ImageDimension,

    /// The format of the backing resource's texel data.
    pub format: Format,

    /// The width and height in texels. Both must be non-zero, and multiples
    /// of the atlas's minimum alignment if one is configured.
    pub extent: [u32; 2],

    /// The number of mip levels. Must be non-zero and at most
    /// [`max_mip_levels`]`(extent)`.
    pub mip_levels: u32,

    /// The number of array layers. At atlas construction this is the initial
    /// layer count; a `Dim2d` atlas must not set it above 1.
    pub array_layers: u32,
}

impl Default for AtlasDescriptor {
    #[inline]
    fn default() -> Self {
        AtlasDescriptor {
            name: String::from("dynamic texture atlas"),
            dimension: ImageDimension::Dim2dArray,
            format: Format::Rgba8Unorm,
            extent: [0; 2],
            mip_levels: 1,
            array_layers: 1,
        }
    }
}

impl AtlasDescriptor {
    /// Returns the byte size of a single array layer at mip level `level`, or
    /// [`None`] if `level` is out of range.
    ///
    /// Block-compressed formats are sized in whole blocks.
    #[inline]
    pub fn mip_level_size(&self, level: u32) -> Option<DeviceSize> {
        let extent = mip_level_extent(self.extent, level)?;
        let block_extent = self.format.block_extent();
        let blocks_x = DeviceSize::from(extent[0].div_ceil(block_extent[0]));
        let blocks_y = DeviceSize::from(extent[1].div_ceil(block_extent[1]));

        Some(blocks_x * blocks_y * self.format.block_size())
    }

    /// Returns the byte size of a single array layer's whole mip chain.
    #[inline]
    pub fn layer_size(&self) -> DeviceSize {
        (0..self.mip_levels)
            .map_while(|level| self.mip_level_size(level))
            .sum()
    }
}

/// Returns the maximum number of mip levels for the given image extent.
///
/// The returned value is always at least 1 for a non-zero extent.
///
/// # Examples
///
/// ```
/// use dynamic_texture_atlas::image::max_mip_levels;
///
/// assert_eq!(max_mip_levels([32, 50]), 6);
/// ```
#[inline]
pub fn max_mip_levels(extent: [u32; 2]) -> u32 {
    // This calculates `floor(log2(max(width, height))) + 1` using fast
    // integer operations.
    32 - (extent[0] | extent[1]).leading_zeros()
}

/// Returns the extent of the `level`th mip level.
/// If `level` is 0, then it returns `extent` back unchanged.
///
/// Returns [`None`] if `level` is not less than [`max_mip_levels`]`(extent)`.
///
/// # Examples
///
/// ```
/// use dynamic_texture_atlas::image::mip_level_extent;
///
/// let extent = [963, 256];
///
/// assert_eq!(mip_level_extent(extent, 0), Some(extent));
/// assert_eq!(mip_level_extent(extent, 1), Some([481, 128]));
/// assert_eq!(mip_level_extent(extent, 6), Some([15, 4]));
/// assert_eq!(mip_level_extent(extent, 9), Some([1, 1]));
/// assert_eq!(mip_level_extent(extent, 11), None);
/// ```
///
/// # Panics
///
/// - In debug mode, panics if `extent` contains 0.
///   In release, returns an unspecified value.
#[inline]
pub fn mip_level_extent(extent: [u32; 2], level: u32) -> Option<[u32; 2]> {
    if level == 0 {
        return Some(extent);
    }

    if level >= max_mip_levels(extent) {
        return None;
    }

    Some(extent.map(|x| {
        debug_assert!(x != 0);
        max(1, x >> level)
    }))
}
