use super::DynamicTextureAtlas;
use guillotiere::Allocation;
use parking_lot::Mutex;
use std::{any::Any, fmt, sync::Arc};

/// One live rectangular region inside a [`DynamicTextureAtlas`].
///
/// A suballocation exclusively owns its region from creation until it is
/// dropped, at which point the region is returned to its slice and the
/// atlas's usage counters are updated, exactly once. The handle is an owned,
/// non-clonable value; wrap it in an [`Arc`] if shared ownership is needed.
///
/// The handle holds the atlas alive for as long as it exists, so the release
/// path always has a live atlas and slice to dispatch into.
pub struct AtlasSuballocation<R> {
    atlas: Arc<DynamicTextureAtlas<R>>,
    region: Allocation,
    slice_index: u32,
    alignment: u32,
    size: [u32; 2],
    user_data: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl<R> AtlasSuballocation<R> {
    pub(super) fn new(
        atlas: Arc<DynamicTextureAtlas<R>>,
        region: Allocation,
        slice_index: u32,
        alignment: u32,
        size: [u32; 2],
    ) -> Self {
        debug_assert!(!region.rectangle.is_empty());

        AtlasSuballocation {
            atlas,
            region,
            slice_index,
            alignment,
            size,
            user_data: Mutex::new(None),
        }
    }

    /// Returns the texel coordinates of the region's top-left corner within
    /// its slice.
    #[inline]
    pub fn origin(&self) -> [u32; 2] {
        [
            self.region.rectangle.min.x as u32 * self.alignment,
            self.region.rectangle.min.y as u32 * self.alignment,
        ]
    }

    /// Returns the size as originally requested, which may be smaller than
    /// the aligned region backing it.
    #[inline]
    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    /// Returns the index of the slice the region lives in.
    #[inline]
    pub fn slice_index(&self) -> u32 {
        self.slice_index
    }

    /// Returns the owning atlas.
    #[inline]
    pub fn atlas(&self) -> &Arc<DynamicTextureAtlas<R>> {
        &self.atlas
    }

    /// Returns `[u-scale, v-scale, u-bias, v-bias]` mapping the unit square
    /// onto this region within the atlas's extent.
    pub fn uv_scale_bias(&self) -> [f32; 4] {
        let extent = self.atlas.desc.extent;
        let origin = self.origin();

        [
            self.size[0] as f32 / extent[0] as f32,
            self.size[1] as f32 / extent[1] as f32,
            origin[0] as f32 / extent[0] as f32,
            origin[1] as f32 / extent[1] as f32,
        ]
    }

    /// Attaches an opaque user payload, replacing any previous one.
    pub fn set_user_data(&self, user_data: Option<Arc<dyn Any + Send + Sync>>) {
        *self.user_data.lock() = user_data;
    }

    /// Returns the attached user payload, if any.
    pub fn user_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.user_data.lock().clone()
    }
}

impl<R> PartialEq for AtlasSuballocation<R> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.atlas, &other.atlas)
            && self.region == other.region
            && self.slice_index == other.slice_index
            && self.alignment == other.alignment
            && self.size == other.size
    }
}

impl<R> Drop for AtlasSuballocation<R> {
    fn drop(&mut self) {
        self.atlas
            .free(self.slice_index, self.alignment, self.region, self.size);
    }
}

impl<R> fmt::Debug for AtlasSuballocation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtlasSuballocation")
            .field("origin", &self.origin())
            .field("size", &self.size)
            .field("slice_index", &self.slice_index)
            .field("alignment", &self.alignment)
            .finish_non_exhaustive()
    }
}
