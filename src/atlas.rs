//! The dynamic texture atlas.
//!
//! An atlas suballocates rectangular regions out of the layers (*slices*) of
//! one layered backing resource. Each request is rounded up to a power-of-two
//! alignment derived from the configured minimum and the request's smaller
//! dimension; each slice is created for exactly one alignment and packs
//! regions in units of that alignment. Slices are created lazily, the first
//! time a request needs them, and live until the atlas is dropped.
//!
//! The backing resource is created and regrown through a caller-supplied
//! [`ResourceProvider`], only from [`DynamicTextureAtlas::resource`] (and
//! optionally at construction). Every growth event bumps the atlas's version,
//! so consumers caching resource bindings can cheaply detect staleness.

mod slice;
mod suballocation;

pub use self::suballocation::AtlasSuballocation;

use self::slice::SlicePool;
use crate::{
    image::{max_mip_levels, AtlasDescriptor, ImageDimension},
    provider::ResourceProvider,
    DeviceSize,
};
use guillotiere::Allocation;
use log::{error, info};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::{
    error::Error,
    fmt::{self, Display},
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
};

/// The hard ceiling on the number of slices a [`Dim2dArray`] atlas can grow
/// to. A [`Dim2d`] atlas is always capped at exactly 1.
///
/// [`Dim2dArray`]: ImageDimension::Dim2dArray
/// [`Dim2d`]: ImageDimension::Dim2d
pub const MAX_ARRAY_LAYERS: u32 = 2048;

/// A dynamic, growable 2D-region suballocator layered over a layered texture
/// resource.
///
/// See [the module-level documentation] for an overview. The atlas is
/// constructed into an [`Arc`] because every [`AtlasSuballocation`] keeps a
/// counted reference to it; the atlas can therefore only be dropped once all
/// of its suballocations have been released.
///
/// [the module-level documentation]: self
pub struct DynamicTextureAtlas<R> {
    desc: AtlasDescriptor,
    min_alignment: u32,
    extra_slice_count: u32,
    max_array_layers: u32,
    pool: SlicePool,
    backing: Mutex<Backing<R>>,
    // Mirrors `backing.layers` for lock-free descriptor and stats snapshots.
    resource_layers: AtomicU32,
    version: AtomicU32,
    allocation_count: AtomicU32,
    allocated_area: AtomicU64,
    used_area: AtomicU64,
}

struct Backing<R> {
    resource: Option<R>,
    // The layer count the resource was created with, 0 if there is none.
    layers: u32,
}

impl<R> DynamicTextureAtlas<R> {
    /// Creates a new `DynamicTextureAtlas` without a backing resource.
    ///
    /// The resource is created by the first [`resource`] call that finds the
    /// atlas non-empty; until then the atlas can already hand out
    /// suballocations.
    ///
    /// # Panics
    ///
    /// - Panics if `create_info.descriptor.extent` contains zero.
    /// - Panics if `create_info.descriptor.mip_levels` is zero or exceeds
    ///   [`max_mip_levels`] of the extent.
    /// - Panics if `create_info.descriptor.dimension` is [`Dim2d`] and
    ///   `create_info.descriptor.array_layers` is greater than 1.
    /// - Panics if `create_info.min_alignment` is neither zero nor a power of
    ///   two.
    /// - Panics if the extent is not a multiple of a non-zero
    ///   `create_info.min_alignment`.
    ///
    /// [`resource`]: Self::resource
    /// [`Dim2d`]: ImageDimension::Dim2d
    pub fn new(create_info: DynamicTextureAtlasCreateInfo) -> Arc<Self> {
        Self::validate_new(&create_info);

        Arc::new(Self::new_inner(create_info, None))
    }

    /// Creates a new `DynamicTextureAtlas` along with its initial backing
    /// resource, sized to `create_info.descriptor.array_layers`. A descriptor
    /// with zero initial layers creates no resource.
    ///
    /// # Panics
    ///
    /// - Panics like [`new`] does on invalid `create_info`.
    ///
    /// # Errors
    ///
    /// - Returns the provider's error if creating the resource fails.
    ///
    /// [`new`]: Self::new
    pub fn with_resource<P>(
        provider: &mut P,
        create_info: DynamicTextureAtlasCreateInfo,
    ) -> Result<Arc<Self>, P::Error>
    where
        P: ResourceProvider<Resource = R>,
    {
        Self::validate_new(&create_info);

        let resource = if create_info.descriptor.array_layers != 0 {
            Some(provider.create_resource(&create_info.descriptor)?)
        } else {
            None
        };

        Ok(Arc::new(Self::new_inner(create_info, resource)))
    }

    fn validate_new(create_info: &DynamicTextureAtlasCreateInfo) {
        let DynamicTextureAtlasCreateInfo {
            descriptor,
            min_alignment,
            extra_slice_count: _,
            max_array_layers: _,
        } = create_info;

        assert!(
            descriptor.extent[0] != 0 && descriptor.extent[1] != 0,
            "`create_info.descriptor.extent` must not contain zero",
        );
        assert!(
            descriptor.mip_levels != 0,
            "`create_info.descriptor.mip_levels` must not be zero",
        );
        assert!(
            descriptor.mip_levels <= max_mip_levels(descriptor.extent),
            "`create_info.descriptor.mip_levels` ({}) must not exceed the maximum for the extent \
            ({})",
            descriptor.mip_levels,
            max_mip_levels(descriptor.extent),
        );

        if descriptor.dimension == ImageDimension::Dim2d {
            assert!(
                descriptor.array_layers <= 1,
                "a `Dim2d` atlas must not have more than one array layer",
            );
        }

        if *min_alignment != 0 {
            assert!(
                min_alignment.is_power_of_two(),
                "`create_info.min_alignment` ({min_alignment}) must be a power of two",
            );
            assert!(
                descriptor.extent[0] % min_alignment == 0
                    && descriptor.extent[1] % min_alignment == 0,
                "`create_info.descriptor.extent` ({} x {}) must be a multiple of \
                `create_info.min_alignment` ({min_alignment})",
                descriptor.extent[0],
                descriptor.extent[1],
            );
        }
    }

    fn new_inner(create_info: DynamicTextureAtlasCreateInfo, resource: Option<R>) -> Self {
        let DynamicTextureAtlasCreateInfo {
            descriptor,
            min_alignment,
            extra_slice_count,
            max_array_layers,
        } = create_info;

        let max_array_layers = match descriptor.dimension {
            ImageDimension::Dim2d => 1,
            ImageDimension::Dim2dArray => max_array_layers.min(MAX_ARRAY_LAYERS),
        };
        let layers = if resource.is_some() {
            descriptor.array_layers
        } else {
            0
        };

        DynamicTextureAtlas {
            min_alignment,
            extra_slice_count,
            max_array_layers,
            pool: SlicePool::new(descriptor.extent, descriptor.array_layers),
            backing: Mutex::new(Backing { resource, layers }),
            resource_layers: AtomicU32::new(layers),
            version: AtomicU32::new(0),
            allocation_count: AtomicU32::new(0),
            allocated_area: AtomicU64::new(0),
            used_area: AtomicU64::new(0),
            desc: descriptor,
        }
    }

    /// Carves a `width` x `height` region out of the first slice that has
    /// room, creating new slices up to the layer cap as needed.
    ///
    /// The request is rounded up to the smallest power-of-two alignment that
    /// is at least the configured minimum and covers the request's smaller
    /// dimension; only slices created for that alignment are considered. The
    /// search makes a single pass over candidate slice indices and never
    /// backtracks, even if a lower-indexed slice frees space concurrently.
    ///
    /// On success the returned suballocation owns the region until it is
    /// dropped.
    ///
    /// # Errors
    ///
    /// - Returns [`AllocateError::ZeroExtent`] if `width` or `height` is
    ///   zero. This is a caller bug; it is reported rather than panicking so
    ///   that no state is disturbed.
    /// - Returns [`AllocateError::ExtentTooLarge`] if the requested or
    ///   aligned size exceeds the atlas's extent.
    /// - Returns [`AllocateError::OutOfAtlasMemory`] if no slice up to the
    ///   layer cap has room. The caller may retry after other suballocations
    ///   have been released.
    ///
    /// All errors leave every counter and the slice pool untouched.
    pub fn allocate(
        self: &Arc<Self>,
        width: u32,
        height: u32,
    ) -> Result<AtlasSuballocation<R>, AllocateError> {
        if width == 0 || height == 0 {
            error!("{}: suballocation size must not be zero", self.desc.name);
            return Err(AllocateError::ZeroExtent);
        }

        if width > self.desc.extent[0] || height > self.desc.extent[1] {
            error!(
                "{}: requested region size {width} x {height} exceeds the atlas extent {} x {}",
                self.desc.name, self.desc.extent[0], self.desc.extent[1],
            );
            return Err(AllocateError::ExtentTooLarge);
        }

        let alignment = compute_alignment(self.min_alignment, [width, height]);
        let aligned_width = align_up(width, alignment);
        let aligned_height = align_up(height, alignment);

        // A non-power-of-two extent can end up smaller than the aligned size
        // even though the request itself fit.
        if aligned_width > self.desc.extent[0] || aligned_height > self.desc.extent[1] {
            error!(
                "{}: aligned region size {aligned_width} x {aligned_height} exceeds the atlas \
                extent {} x {}",
                self.desc.name, self.desc.extent[0], self.desc.extent[1],
            );
            return Err(AllocateError::ExtentTooLarge);
        }

        let mut slice_index = 0;
        let region = loop {
            if slice_index >= self.max_array_layers {
                break None;
            }

            let Some((index, slice)) = self.pool.find_or_create(
                slice_index,
                alignment,
                self.extra_slice_count,
                self.max_array_layers,
            ) else {
                break None;
            };
            slice_index = index;

            // The potentially slow packer call happens after the pool lock has
            // been released, holding only the slice's own lock.
            if let Some(region) =
                slice.allocate([aligned_width / alignment, aligned_height / alignment])
            {
                break Some(region);
            }

            slice_index += 1;
        };

        let Some(region) = region else {
            error!(
                "{}: failed to suballocate a {width} x {height} region",
                self.desc.name,
            );
            return Err(AllocateError::OutOfAtlasMemory);
        };

        self.allocated_area
            .fetch_add(u64::from(width) * u64::from(height), Ordering::Relaxed);
        self.used_area.fetch_add(
            u64::from(aligned_width) * u64::from(aligned_height),
            Ordering::Relaxed,
        );
        self.allocation_count.fetch_add(1, Ordering::Relaxed);

        Ok(AtlasSuballocation::new(
            self.clone(),
            region,
            slice_index,
            alignment,
            [width, height],
        ))
    }

    // Returns a region to its slice. Invoked from the suballocation's drop
    // path, exactly once per allocation.
    fn free(&self, slice_index: u32, alignment: u32, region: Allocation, size: [u32; 2]) {
        let aligned_width = align_up(size[0], alignment);
        let aligned_height = align_up(size[1], alignment);

        self.allocated_area
            .fetch_sub(u64::from(size[0]) * u64::from(size[1]), Ordering::Relaxed);
        self.used_area.fetch_sub(
            u64::from(aligned_width) * u64::from(aligned_height),
            Ordering::Relaxed,
        );
        self.allocation_count.fetch_sub(1, Ordering::Relaxed);

        self.pool.get(slice_index, alignment).free(region);
    }

    /// Returns the current backing resource, growing it first if slices were
    /// created since the resource was last (re)created.
    ///
    /// Growing creates a new resource sized to the current slice storage,
    /// copies every existing layer and mip level of the old resource into it
    /// through the provider, discards the old resource and bumps the
    /// [version]. The layer count never shrinks. When no growth is needed the
    /// call is side-effect-free.
    ///
    /// Returns `Ok(None)` only when the atlas has never had a layer.
    ///
    /// This is intended to be called from a single logical owner at a time,
    /// for example once per frame; concurrent calls are serialized by the
    /// resource lock.
    ///
    /// # Errors
    ///
    /// - Returns the provider's error if creating the new resource fails. The
    ///   old resource and the version are left untouched.
    ///
    /// [version]: Self::version
    pub fn resource<P>(&self, provider: &mut P) -> Result<Option<MappedMutexGuard<'_, R>>, P::Error>
    where
        P: ResourceProvider<Resource = R>,
    {
        let mut backing = self.backing.lock();

        let layer_count = self.pool.slot_count();
        if backing.layers != layer_count {
            let mut descriptor = self.desc.clone();
            descriptor.array_layers = layer_count;

            let mut new_resource = provider.create_resource(&descriptor)?;
            let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;

            info!(
                "{}: expanding texture array ({} x {} {}-mip {:?}) to {} slices, version {}",
                self.desc.name,
                self.desc.extent[0],
                self.desc.extent[1],
                self.desc.mip_levels,
                self.desc.format,
                layer_count,
                version,
            );

            if let Some(old_resource) = backing.resource.take() {
                for layer in 0..backing.layers {
                    for mip_level in 0..self.desc.mip_levels {
                        provider.copy_layer(&old_resource, &mut new_resource, layer, mip_level);
                    }
                }
            }

            backing.resource = Some(new_resource);
            backing.layers = layer_count;
            self.resource_layers.store(layer_count, Ordering::Relaxed);
        }

        match MutexGuard::try_map(backing, |backing| backing.resource.as_mut()) {
            Ok(resource) => Ok(Some(resource)),
            Err(_) => Ok(None),
        }
    }

    /// Returns a snapshot of the atlas's descriptor, with `array_layers` set
    /// to the backing resource's current layer count.
    pub fn descriptor(&self) -> AtlasDescriptor {
        let mut descriptor = self.desc.clone();
        descriptor.array_layers = self.resource_layers.load(Ordering::Relaxed);

        descriptor
    }

    /// Returns the version of the backing resource.
    ///
    /// The version increases by exactly one each time the resource is
    /// regrown, and never otherwise. Consumers holding cached resource
    /// bindings compare against it to detect that they are stale.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Relaxed)
    }

    /// Computes a snapshot of the atlas's usage.
    ///
    /// The counters are independent atomics: a snapshot taken while other
    /// threads allocate or free may observe one counter updated before
    /// another. Each counter on its own is always exact.
    pub fn usage_stats(&self) -> AtlasUsageStats {
        let array_layers = self.resource_layers.load(Ordering::Relaxed);

        AtlasUsageStats {
            size: self.desc.layer_size() * DeviceSize::from(array_layers),
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            total_area: u64::from(self.desc.extent[0])
                * u64::from(self.desc.extent[1])
                * u64::from(array_layers),
            allocated_area: self.allocated_area.load(Ordering::Relaxed),
            used_area: self.used_area.load(Ordering::Relaxed),
        }
    }
}

impl<R> Drop for DynamicTextureAtlas<R> {
    fn drop(&mut self) {
        // Every suballocation holds an `Arc` of its atlas; non-zero counters
        // here mean a region was leaked without its drop running.
        debug_assert_eq!(self.allocation_count.load(Ordering::Relaxed), 0);
        debug_assert_eq!(self.allocated_area.load(Ordering::Relaxed), 0);
        debug_assert_eq!(self.used_area.load(Ordering::Relaxed), 0);
    }
}

impl<R> fmt::Debug for DynamicTextureAtlas<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicTextureAtlas")
            .field("desc", &self.desc)
            .field("min_alignment", &self.min_alignment)
            .field("max_array_layers", &self.max_array_layers)
            .field("version", &self.version)
            .field("allocation_count", &self.allocation_count)
            .finish_non_exhaustive()
    }
}

/// Parameters to create a new [`DynamicTextureAtlas`].
#[derive(Clone, Debug)]
pub struct DynamicTextureAtlasCreateInfo {
    /// The logical shape of the backing resource. `descriptor.array_layers`
    /// is the initial layer count, which also pre-sizes the slice storage.
    ///
    /// The default value is [`AtlasDescriptor::default()`], which must have
    /// its `extent` filled in.
    pub descriptor: AtlasDescriptor,

    /// The smallest alignment requests are rounded up to, or 0 to leave
    /// requests unconstrained. Must be a power of two if non-zero.
    ///
    /// The default value is `0`.
    pub min_alignment: u32,

    /// How many slice slots to add per storage growth, or 0 to double the
    /// current storage instead.
    ///
    /// The default value is `0`.
    pub extra_slice_count: u32,

    /// The maximum number of slices the atlas may grow to. Clamped to
    /// [`MAX_ARRAY_LAYERS`] for a [`Dim2dArray`] atlas and to 1 for a
    /// [`Dim2d`] atlas.
    ///
    /// The default value is [`MAX_ARRAY_LAYERS`].
    ///
    /// [`Dim2dArray`]: ImageDimension::Dim2dArray
    /// [`Dim2d`]: ImageDimension::Dim2d
    pub max_array_layers: u32,
}

impl Default for DynamicTextureAtlasCreateInfo {
    #[inline]
    fn default() -> Self {
        DynamicTextureAtlasCreateInfo {
            descriptor: AtlasDescriptor::default(),
            min_alignment: 0,
            extra_slice_count: 0,
            max_array_layers: MAX_ARRAY_LAYERS,
        }
    }
}

/// A snapshot of an atlas's resource footprint and allocation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AtlasUsageStats {
    /// The byte size of the backing resource across all layers and mip
    /// levels.
    pub size: DeviceSize,

    /// The number of currently live suballocations.
    pub allocation_count: u32,

    /// The texel area of all layers of the backing resource combined.
    pub total_area: u64,

    /// The texel area currently allocated, as requested by callers.
    pub allocated_area: u64,

    /// The texel area currently reserved, after rounding requests up to their
    /// alignment.
    pub used_area: u64,
}

/// Error that can be returned when allocating a region from an atlas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocateError {
    /// The requested width or height was zero.
    ZeroExtent,

    /// The requested size, possibly after alignment, exceeds the atlas's
    /// extent.
    ExtentTooLarge,

    /// No slice up to the layer cap had room for the request.
    OutOfAtlasMemory,
}

impl Error for AllocateError {}

impl Display for AllocateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::ZeroExtent => "the requested extent contains zero",
            Self::ExtentTooLarge => "the requested extent exceeds the atlas extent",
            Self::OutOfAtlasMemory => "out of atlas memory",
        };

        f.write_str(msg)
    }
}

// The smallest power-of-two alignment that is at least `min_alignment` and at
// least as coarse as the request's smaller dimension allows, or 1 if
// unconstrained. Identical requests always compute identical alignments.
fn compute_alignment(min_alignment: u32, extent: [u32; 2]) -> u32 {
    if min_alignment == 0 {
        return 1;
    }

    let mut alignment = min_alignment;
    while extent[0].min(extent[1]) > alignment {
        alignment *= 2;
    }

    alignment
}

fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());

    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{format::Format, image::AtlasDescriptor};
    use std::thread;

    struct MockResource {
        layers: u32,
    }

    #[derive(Debug, PartialEq, Eq)]
    struct CreateFailed;

    #[derive(Default)]
    struct MockProvider {
        created: u32,
        copied: Vec<(u32, u32)>,
        fail: bool,
    }

    impl ResourceProvider for MockProvider {
        type Resource = MockResource;
        type Error = CreateFailed;

        fn create_resource(
            &mut self,
            descriptor: &AtlasDescriptor,
        ) -> Result<MockResource, CreateFailed> {
            if self.fail {
                return Err(CreateFailed);
            }

            self.created += 1;

            Ok(MockResource {
                layers: descriptor.array_layers,
            })
        }

        fn copy_layer(
            &mut self,
            src: &MockResource,
            dst: &mut MockResource,
            layer: u32,
            mip_level: u32,
        ) {
            assert!(layer < src.layers);
            assert!(layer < dst.layers);
            self.copied.push((layer, mip_level));
        }
    }

    fn create_info(
        extent: [u32; 2],
        min_alignment: u32,
        max_array_layers: u32,
    ) -> DynamicTextureAtlasCreateInfo {
        DynamicTextureAtlasCreateInfo {
            descriptor: AtlasDescriptor {
                extent,
                array_layers: 0,
                ..Default::default()
            },
            min_alignment,
            max_array_layers,
            ..Default::default()
        }
    }

    #[test]
    fn conservation() {
        let atlas = DynamicTextureAtlas::<MockResource>::new(create_info([256, 256], 0, 4));
        let sizes = [(16, 16), (32, 8), (7, 5), (100, 3), (16, 16)];

        let mut allocs = Vec::new();
        let mut live_area = 0u64;

        for &(width, height) in &sizes {
            allocs.push(atlas.allocate(width, height).unwrap());
            live_area += u64::from(width) * u64::from(height);
        }

        let stats = atlas.usage_stats();
        assert_eq!(stats.allocation_count, sizes.len() as u32);
        assert_eq!(stats.allocated_area, live_area);
        // With no minimum alignment the used area equals the allocated area.
        assert_eq!(stats.used_area, live_area);

        for alloc in allocs.drain(..2) {
            live_area -= u64::from(alloc.size()[0]) * u64::from(alloc.size()[1]);
            drop(alloc);
        }

        let stats = atlas.usage_stats();
        assert_eq!(stats.allocation_count, 3);
        assert_eq!(stats.allocated_area, live_area);

        drop(allocs);

        let stats = atlas.usage_stats();
        assert_eq!(stats.allocation_count, 0);
        assert_eq!(stats.allocated_area, 0);
        assert_eq!(stats.used_area, 0);
    }

    #[test]
    fn alignment_computation() {
        assert_eq!(compute_alignment(0, [64, 64]), 1);
        assert_eq!(compute_alignment(0, [250, 3]), 1);
        assert_eq!(compute_alignment(64, [64, 64]), 64);
        assert_eq!(compute_alignment(64, [65, 100]), 128);
        assert_eq!(compute_alignment(64, [250, 250]), 256);
        assert_eq!(compute_alignment(16, [3, 7]), 16);

        for width in [1u32, 3, 17, 64, 250, 1000] {
            let alignment = compute_alignment(64, [width, width]);
            assert!(alignment.is_power_of_two());
            assert!(alignment >= 64);
            assert!(alignment <= width.next_power_of_two().max(64));

            // Identical requests always land in the same bucket.
            assert_eq!(alignment, compute_alignment(64, [width, width]));
        }
    }

    #[test]
    fn no_overlap_within_a_slice() {
        let atlas = DynamicTextureAtlas::<MockResource>::new(create_info([128, 128], 0, 1));

        let mut allocs = Vec::new();
        for _ in 0..16 {
            allocs.push(atlas.allocate(16, 16).unwrap());
        }
        allocs.push(atlas.allocate(40, 12).unwrap());

        for (i, a) in allocs.iter().enumerate() {
            for b in &allocs[i + 1..] {
                assert_eq!(a.slice_index(), b.slice_index());

                let (a_origin, a_size) = (a.origin(), a.size());
                let (b_origin, b_size) = (b.origin(), b.size());
                let disjoint = a_origin[0] + a_size[0] <= b_origin[0]
                    || b_origin[0] + b_size[0] <= a_origin[0]
                    || a_origin[1] + a_size[1] <= b_origin[1]
                    || b_origin[1] + b_size[1] <= a_origin[1];

                assert!(disjoint, "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn free_restores_the_pool() {
        let atlas = DynamicTextureAtlas::<MockResource>::new(create_info([256, 256], 16, 4));
        let before = atlas.usage_stats();

        let alloc = atlas.allocate(33, 17).unwrap();
        let during = atlas.usage_stats();
        assert_eq!(during.allocated_area, 33 * 17);
        assert_eq!(during.used_area, 64 * 32);
        assert_eq!(during.allocation_count, 1);
        drop(alloc);

        assert_eq!(atlas.usage_stats(), before);

        // The same shape lands in the same place again.
        let alloc = atlas.allocate(33, 17).unwrap();
        assert_eq!(alloc.slice_index(), 0);
        assert_eq!(atlas.usage_stats(), during);
    }

    #[test]
    fn boundary_requests_fail_without_side_effects() {
        let atlas = DynamicTextureAtlas::<MockResource>::new(create_info([256, 256], 0, 4));

        assert_eq!(atlas.allocate(0, 10), Err(AllocateError::ZeroExtent));
        assert_eq!(atlas.allocate(10, 0), Err(AllocateError::ZeroExtent));
        assert_eq!(atlas.allocate(257, 10), Err(AllocateError::ExtentTooLarge));
        assert_eq!(atlas.allocate(10, 300), Err(AllocateError::ExtentTooLarge));

        assert_eq!(atlas.usage_stats(), AtlasUsageStats::default());
        assert_eq!(atlas.version(), 0);
        assert_eq!(atlas.descriptor().array_layers, 0);
        assert_eq!(atlas.pool.slot_count(), 0);
    }

    #[test]
    fn layer_cap_exhaustion_is_recoverable() {
        let atlas = DynamicTextureAtlas::<MockResource>::new(create_info([64, 64], 0, 2));

        let a = atlas.allocate(64, 64).unwrap();
        let b = atlas.allocate(64, 64).unwrap();
        assert_eq!(atlas.allocate(64, 64), Err(AllocateError::OutOfAtlasMemory));

        // Exhaustion left the counters alone and the pool retryable.
        let stats = atlas.usage_stats();
        assert_eq!(stats.allocation_count, 2);
        assert_eq!(stats.allocated_area, 2 * 64 * 64);

        drop(a);
        let c = atlas.allocate(64, 64).unwrap();
        assert_eq!(c.slice_index(), 0);
        drop(b);
        drop(c);
    }

    #[test]
    fn non_layered_atlas_is_capped_at_one_slice() {
        let atlas = DynamicTextureAtlas::<MockResource>::new(DynamicTextureAtlasCreateInfo {
            descriptor: AtlasDescriptor {
                dimension: ImageDimension::Dim2d,
                extent: [64, 64],
                ..Default::default()
            },
            ..Default::default()
        });

        let a = atlas.allocate(64, 64).unwrap();
        assert_eq!(atlas.allocate(1, 1), Err(AllocateError::OutOfAtlasMemory));
        drop(a);
    }

    // The reference walkthrough: alignment buckets separate the two request
    // shapes into their own slices, and freeing makes slice 0 reusable
    // without creating a third slice.
    #[test]
    fn bucketed_placement_scenario() {
        let atlas = DynamicTextureAtlas::<MockResource>::new(create_info([256, 256], 64, 4));

        let small = atlas.allocate(64, 64).unwrap();
        assert_eq!(small.slice_index(), 0);
        assert_eq!(small.origin(), [0, 0]);
        assert_eq!(small.uv_scale_bias(), [0.25, 0.25, 0.0, 0.0]);
        assert_eq!(atlas.usage_stats().used_area, 64 * 64);

        // min(250, 250) pushes the alignment past 64 up to 256, so the
        // request occupies a whole fresh slice instead of slice 0.
        let large = atlas.allocate(250, 250).unwrap();
        assert_eq!(large.slice_index(), 1);
        assert_eq!(atlas.usage_stats().used_area, 64 * 64 + 256 * 256);
        assert_eq!(atlas.usage_stats().allocated_area, 64 * 64 + 250 * 250);

        drop(small);
        let stats = atlas.usage_stats();
        assert_eq!(stats.used_area, 256 * 256);
        assert_eq!(stats.allocation_count, 1);

        // Slice 0 is still registered for alignment 64 and is reused rather
        // than creating slice 2.
        let small = atlas.allocate(64, 64).unwrap();
        assert_eq!(small.slice_index(), 0);

        drop(small);
        drop(large);
    }

    #[test]
    fn growth_bumps_the_version_exactly_once() {
        let mut provider = MockProvider::default();
        let atlas = DynamicTextureAtlas::new(create_info([128, 128], 0, 4));

        // Nothing to grow, nothing to return.
        assert!(atlas.resource(&mut provider).unwrap().is_none());
        assert_eq!(atlas.version(), 0);
        assert_eq!(provider.created, 0);

        let a = atlas.allocate(128, 128).unwrap();
        {
            let resource = atlas.resource(&mut provider).unwrap().unwrap();
            assert_eq!(resource.layers, 1);
        }
        assert_eq!(atlas.version(), 1);
        assert_eq!(provider.created, 1);
        assert!(provider.copied.is_empty());
        assert_eq!(atlas.descriptor().array_layers, 1);

        // No growth in between: the version must not move.
        assert!(atlas.resource(&mut provider).unwrap().is_some());
        assert_eq!(atlas.version(), 1);
        assert_eq!(provider.created, 1);

        let b = atlas.allocate(128, 128).unwrap();
        assert_eq!(b.slice_index(), 1);
        {
            let resource = atlas.resource(&mut provider).unwrap().unwrap();
            assert_eq!(resource.layers, 2);
        }
        assert_eq!(atlas.version(), 2);
        assert_eq!(provider.copied, [(0, 0)]);

        let stats = atlas.usage_stats();
        assert_eq!(stats.total_area, 128 * 128 * 2);
        assert_eq!(stats.size, 128 * 128 * 4 * 2);

        drop(a);
        drop(b);
    }

    #[test]
    fn failed_growth_leaves_the_resource_and_version_untouched() {
        let mut provider = MockProvider::default();
        let atlas = DynamicTextureAtlas::new(create_info([64, 64], 0, 4));

        let a = atlas.allocate(64, 64).unwrap();

        provider.fail = true;
        assert_eq!(atlas.resource(&mut provider).map(|_| ()), Err(CreateFailed));
        assert_eq!(atlas.version(), 0);
        assert_eq!(atlas.descriptor().array_layers, 0);

        provider.fail = false;
        assert!(atlas.resource(&mut provider).unwrap().is_some());
        assert_eq!(atlas.version(), 1);

        drop(a);
    }

    #[test]
    fn initial_resource_counts_its_layers() {
        let mut provider = MockProvider::default();
        let atlas = DynamicTextureAtlas::with_resource(
            &mut provider,
            DynamicTextureAtlasCreateInfo {
                descriptor: AtlasDescriptor {
                    extent: [128, 128],
                    mip_levels: 3,
                    array_layers: 2,
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(provider.created, 1);
        assert_eq!(atlas.version(), 0);
        assert_eq!(atlas.descriptor().array_layers, 2);

        let stats = atlas.usage_stats();
        assert_eq!(stats.total_area, 128 * 128 * 2);
        assert_eq!(stats.size, (128 * 128 + 64 * 64 + 32 * 32) * 4 * 2);

        // The pre-sized storage needs no growth for the first two slices.
        let a = atlas.allocate(128, 128).unwrap();
        let b = atlas.allocate(128, 128).unwrap();
        assert!(atlas.resource(&mut provider).unwrap().is_some());
        assert_eq!(atlas.version(), 0);
        assert_eq!(provider.created, 1);

        drop(a);
        drop(b);
    }

    #[test]
    fn concurrent_allocations_balance_exactly() {
        const THREADS: u32 = 8;
        const ITERATIONS: u32 = 64;

        let atlas = DynamicTextureAtlas::<MockResource>::new(create_info([1024, 1024], 8, 16));

        let kept = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|t| {
                    let atlas = &atlas;

                    scope.spawn(move || {
                        let size = 8 << (t % 3);
                        let mut kept = Vec::new();

                        for i in 0..ITERATIONS {
                            let alloc = atlas.allocate(size, size).unwrap();

                            if i % 8 == 0 {
                                kept.push(alloc);
                            }
                        }

                        kept
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        let mut expected_allocated = 0u64;
        let mut expected_used = 0u64;
        for alloc in &kept {
            let [width, height] = alloc.size();
            let alignment = compute_alignment(8, [width, height]);
            expected_allocated += u64::from(width) * u64::from(height);
            expected_used +=
                u64::from(align_up(width, alignment)) * u64::from(align_up(height, alignment));
        }

        let stats = atlas.usage_stats();
        assert_eq!(stats.allocation_count, kept.len() as u32);
        assert_eq!(stats.allocated_area, expected_allocated);
        assert_eq!(stats.used_area, expected_used);

        drop(kept);

        let stats = atlas.usage_stats();
        assert_eq!(stats.allocation_count, 0);
        assert_eq!(stats.allocated_area, 0);
        assert_eq!(stats.used_area, 0);
    }

    #[test]
    #[should_panic(expected = "must not contain zero")]
    fn create_rejects_zero_extent() {
        DynamicTextureAtlas::<MockResource>::new(create_info([0, 256], 0, 4));
    }

    #[test]
    #[should_panic(expected = "must be a power of two")]
    fn create_rejects_non_power_of_two_alignment() {
        DynamicTextureAtlas::<MockResource>::new(create_info([256, 256], 48, 4));
    }

    #[test]
    #[should_panic(expected = "must be a multiple of")]
    fn create_rejects_non_dividing_alignment() {
        DynamicTextureAtlas::<MockResource>::new(create_info([192, 256], 128, 4));
    }

    #[test]
    #[should_panic(expected = "must not exceed the maximum")]
    fn create_rejects_excessive_mip_levels() {
        DynamicTextureAtlas::<MockResource>::new(DynamicTextureAtlasCreateInfo {
            descriptor: AtlasDescriptor {
                extent: [64, 64],
                mip_levels: 8,
                ..Default::default()
            },
            ..Default::default()
        });
    }

    #[test]
    #[should_panic(expected = "more than one array layer")]
    fn create_rejects_layered_non_array_descriptor() {
        DynamicTextureAtlas::<MockResource>::new(DynamicTextureAtlasCreateInfo {
            descriptor: AtlasDescriptor {
                dimension: ImageDimension::Dim2d,
                extent: [64, 64],
                array_layers: 2,
                ..Default::default()
            },
            ..Default::default()
        });
    }

    #[test]
    fn compressed_formats_size_in_blocks() {
        let atlas = DynamicTextureAtlas::<MockResource>::new(DynamicTextureAtlasCreateInfo {
            descriptor: AtlasDescriptor {
                format: Format::Bc1RgbaUnorm,
                extent: [256, 256],
                array_layers: 0,
                ..Default::default()
            },
            min_alignment: 4,
            ..Default::default()
        });

        let a = atlas.allocate(64, 64).unwrap();
        drop(a);

        let mut provider = MockProvider::default();
        assert!(atlas.resource(&mut provider).unwrap().is_some());
        // 64 x 64 blocks of 8 bytes each.
        assert_eq!(atlas.usage_stats().size, 64 * 64 * 8);
    }
}
