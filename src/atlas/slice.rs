use foldhash::HashMap;
use guillotiere::{size2, Allocation, AtlasAllocator};
use log::debug;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::Arc;

/// One layer of the backing resource, with its own independent 2D free-space
/// tracker.
///
/// The packer is not thread-safe; the slice's mutex serializes all access to
/// it. Each slice's lock is independent of every other slice's lock and of
/// the pool-wide lock, so traffic on different slices never contends.
pub(super) struct Slice {
    packer: Mutex<AtlasAllocator>,
}

impl Slice {
    fn new(cell_extent: [u32; 2]) -> Self {
        Slice {
            packer: Mutex::new(AtlasAllocator::new(size2(
                cell_extent[0] as i32,
                cell_extent[1] as i32,
            ))),
        }
    }

    /// Reserves a `cells[0]` x `cells[1]` rectangle, or returns [`None`] if
    /// the slice has no fitting free space.
    pub(super) fn allocate(&self, cells: [u32; 2]) -> Option<Allocation> {
        self.packer
            .lock()
            .allocate(size2(cells[0] as i32, cells[1] as i32))
    }

    /// Returns a previously reserved rectangle to the free pool.
    ///
    /// Freeing the same allocation twice is a caller contract violation; the
    /// packer panics on ids it doesn't know.
    pub(super) fn free(&self, allocation: Allocation) {
        self.packer.lock().deallocate(allocation.id);
    }
}

/// The growable collection of slices plus the alignment index.
///
/// All index bookkeeping (the alignment-to-slice map, slot storage extension,
/// lazy slice construction) happens under one pool-wide lock. The packer call
/// itself is made by the caller after this lock is released, holding only the
/// slice's own lock, which bounds pool-lock hold time to O(1) amortized work
/// independent of packer cost.
pub(super) struct SlicePool {
    extent: [u32; 2],
    state: Mutex<PoolState>,
}

struct PoolState {
    /// Index-stable slot storage. Slots are extended in batches, constructed
    /// lazily on first use and never dropped individually.
    slices: Vec<Option<Arc<Slice>>>,

    /// Maps an alignment to the slice indices created for it, in ascending
    /// order. A slice index appears in exactly one bucket.
    buckets: HashMap<u32, SmallVec<[u32; 8]>>,

    /// Lowest slice index that has never been bound to an alignment.
    next_unused: u32,
}

impl SlicePool {
    pub(super) fn new(extent: [u32; 2], initial_slots: u32) -> Self {
        SlicePool {
            extent,
            state: Mutex::new(PoolState {
                slices: vec![None; initial_slots as usize],
                buckets: HashMap::default(),
                next_unused: 0,
            }),
        }
    }

    /// Returns the number of slice slots currently backing the pool, whether
    /// constructed or not. The backing resource is sized to this count.
    pub(super) fn slot_count(&self) -> u32 {
        self.state.lock().slices.len() as u32
    }

    /// Finds the first slice registered for `alignment` at or after `cursor`,
    /// or creates one at the next never-used index, extending slot storage in
    /// batches as needed.
    ///
    /// Returns [`None`] once the layer cap is exhausted for this request.
    pub(super) fn find_or_create(
        &self,
        cursor: u32,
        alignment: u32,
        extra_slice_count: u32,
        max_array_layers: u32,
    ) -> Option<(u32, Arc<Slice>)> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let bucket = state.buckets.entry(alignment).or_default();
        let index = bucket
            .iter()
            .copied()
            .find(|&index| index >= cursor)
            .unwrap_or(state.next_unused);

        let slice = if index == state.next_unused {
            if index == max_array_layers {
                return None;
            }

            while index as usize >= state.slices.len() {
                let batch = if extra_slice_count != 0 {
                    extra_slice_count
                } else {
                    state.slices.len() as u32
                }
                .max(1);
                let len = index.saturating_add(batch).min(max_array_layers);

                state.slices.resize(len as usize, None);
            }

            debug_assert!(
                !bucket.contains(&index),
                "slice {index} is already registered for alignment {alignment}",
            );
            bucket.push(index);

            debug_assert!(state.slices[index as usize].is_none());
            let slice = Arc::new(Slice::new([
                self.extent[0] / alignment,
                self.extent[1] / alignment,
            ]));
            state.slices[index as usize] = Some(slice.clone());
            state.next_unused += 1;

            debug!("created slice {index} with alignment {alignment}");

            slice
        } else {
            // A registered slice is always constructed.
            state.slices[index as usize].as_ref().unwrap().clone()
        };

        Some((index, slice))
    }

    /// Fetches the slice a live allocation points into. The region itself is
    /// returned to the packer by the caller, outside the pool lock.
    pub(super) fn get(&self, index: u32, alignment: u32) -> Arc<Slice> {
        let state = self.state.lock();

        debug_assert!(
            state
                .buckets
                .get(&alignment)
                .is_some_and(|bucket| bucket.contains(&index)),
            "slice {index} does not use alignment {alignment}",
        );

        // Live allocations only ever point into constructed slices.
        state.slices[index as usize].as_ref().unwrap().clone()
    }
}
