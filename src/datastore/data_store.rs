use std::mem;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use crossbeam::epoch::{self, Atomic, Owned, Shared};
use roaring::RoaringBitmap;
use tracing::{debug, trace};
use crate::core::config::GrowStrategy;
use crate::core::generation::Generation;
use crate::core::stats::{AddressSpace, MemoryUsage};
use crate::datastore::compaction::{CompactionSpec, CompactionStrategy};
use crate::datastore::entry_ref::{EntryRef, MAX_BUFFERS, MAX_ENTRIES_PER_BUFFER};
use crate::datastore::hold_list::GenerationHoldList;

/// Fixed-capacity array of slots. Each slot owns one boxed entry or is null.
struct Buffer<T> {
    slots: Box<[Atomic<T>]>,
}

impl<T> Buffer<T> {
    fn new(capacity: usize) -> Self {
        Buffer {
            slots: (0..capacity).map(|_| Atomic::null()).collect(),
        }
    }
}

impl<T> Drop for Buffer<T> {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            // SAFETY: a buffer is dropped either with `&mut` access or after an epoch
            // grace period, so no reader still dereferences its slots.
            unsafe {
                let shared = slot.load(Ordering::Relaxed, epoch::unprotected());
                if !shared.is_null() {
                    drop(shared.into_owned());
                }
            }
        }
    }
}

/// The part of a data store readers may touch.
struct StoreShared<T> {
    buffers: Box<[Atomic<Buffer<T>>]>,
}

impl<T> StoreShared<T> {
    fn new() -> Self {
        StoreShared {
            buffers: (0..MAX_BUFFERS).map(|_| Atomic::null()).collect(),
        }
    }

    fn with<R>(&self, r: EntryRef, f: impl FnOnce(&T) -> R) -> Option<R> {
        if !r.valid() {
            return None;
        }
        let guard = epoch::pin();
        let buffer = self.buffers.get(r.buffer_id() as usize)?.load(Ordering::Acquire, &guard);
        // SAFETY: buffers and slot contents are only destroyed through `defer_destroy`,
        // which waits for this pin.
        let buffer = unsafe { buffer.as_ref() }?;
        let slot = buffer.slots.get(r.offset() as usize)?.load(Ordering::Acquire, &guard);
        let entry = unsafe { slot.as_ref() }?;
        Some(f(entry))
    }

    fn publish(&self, r: EntryRef, value: T) {
        let guard = epoch::pin();
        let buffer = self.buffers[r.buffer_id() as usize].load(Ordering::Acquire, &guard);
        // SAFETY: only the writer frees buffers and it is the caller.
        let buffer = unsafe { buffer.as_ref() }.expect("publish into unallocated buffer");
        let old = buffer.slots[r.offset() as usize].swap(Owned::new(value), Ordering::AcqRel, &guard);
        if !old.is_null() {
            // SAFETY: unlinked above; readers pinned earlier keep it alive.
            unsafe { guard.defer_destroy(old) };
        }
    }

    fn clear_slot(&self, r: EntryRef) {
        let guard = epoch::pin();
        let buffer = self.buffers[r.buffer_id() as usize].load(Ordering::Acquire, &guard);
        // SAFETY: as in `publish`.
        if let Some(buffer) = unsafe { buffer.as_ref() } {
            let old = buffer.slots[r.offset() as usize].swap(Shared::null(), Ordering::AcqRel, &guard);
            if !old.is_null() {
                unsafe { guard.defer_destroy(old) };
            }
        }
    }

    fn install_buffer(&self, buffer_id: u32, capacity: usize) {
        let guard = epoch::pin();
        let old = self.buffers[buffer_id as usize].swap(
            Owned::new(Buffer::new(capacity)),
            Ordering::AcqRel,
            &guard,
        );
        if !old.is_null() {
            unsafe { guard.defer_destroy(old) };
        }
    }

    fn release_buffer(&self, buffer_id: u32) {
        let guard = epoch::pin();
        let old = self.buffers[buffer_id as usize].swap(Shared::null(), Ordering::AcqRel, &guard);
        if !old.is_null() {
            // SAFETY: the buffer is unlinked; its slots go with it after the grace period.
            unsafe { guard.defer_destroy(old) };
        }
    }
}

impl<T> Drop for StoreShared<T> {
    fn drop(&mut self) {
        for buffer in self.buffers.iter() {
            // SAFETY: last owner of the shared state, no reader left.
            unsafe {
                let shared = buffer.load(Ordering::Relaxed, epoch::unprotected());
                if !shared.is_null() {
                    drop(shared.into_owned());
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BufferState {
    #[default]
    Free,
    Active,
    Hold,
}

/// Writer-side bookkeeping for one buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferMeta {
    pub state: BufferState,
    pub capacity: u32,
    pub used: u32,
    pub dead: u32,
    pub hold: u32,
    pub compacting: bool,
    free_list: Vec<u32>,
}

impl BufferMeta {
    pub fn live(&self) -> u32 {
        self.used - self.dead - self.hold
    }
}

/// Multi-buffer arena handing out [`EntryRef`]s.
///
/// One writer owns the `DataStore`; any number of [`DataStoreReader`]s read
/// concurrently. Freed entries go through a generation hold list before their slot is
/// reused, and compacted buffers are held the same way before being released.
pub struct DataStore<T> {
    shared: Arc<StoreShared<T>>,
    buffers: Vec<BufferMeta>,
    active: Option<u32>,
    hold_entries: GenerationHoldList<EntryRef>,
    hold_buffers: GenerationHoldList<u32>,
    grow: GrowStrategy,
    free_lists: bool,
}

impl<T: Send + Sync + 'static> DataStore<T> {
    pub fn new(grow: GrowStrategy) -> Self {
        DataStore {
            shared: Arc::new(StoreShared::new()),
            buffers: vec![BufferMeta::default(); MAX_BUFFERS as usize],
            active: None,
            hold_entries: GenerationHoldList::new(),
            hold_buffers: GenerationHoldList::new(),
            grow,
            free_lists: true,
        }
    }

    pub fn set_free_lists(&mut self, enabled: bool) {
        self.free_lists = enabled;
        if !enabled {
            self.buffers.iter_mut().for_each(|meta| {
                meta.free_list.clear();
            });
        }
    }

    pub fn reader(&self) -> DataStoreReader<T> {
        DataStoreReader {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn allocate(&mut self, value: T) -> EntryRef {
        let r = self.reserve_slot();
        self.shared.publish(r, value);
        r
    }

    pub fn with<R>(&self, r: EntryRef, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.shared.with(r, f)
    }

    /// Retire an entry. Its slot is reused once readers have moved past the generation
    /// assigned to it.
    pub fn hold_entry(&mut self, r: EntryRef) {
        assert!(r.valid(), "hold of invalid entry ref");
        let meta = &mut self.buffers[r.buffer_id() as usize];
        assert!(meta.state != BufferState::Free, "hold of entry in free buffer {:?}", r);
        meta.hold += 1;
        self.hold_entries.insert(r);
    }

    pub fn assign_generation(&mut self, current: Generation) {
        self.hold_entries.assign_generation(current);
        self.hold_buffers.assign_generation(current);
    }

    pub fn reclaim_memory(&mut self, oldest_used: Generation) {
        let shared = &self.shared;
        let buffers = &mut self.buffers;
        let free_lists = self.free_lists;
        self.hold_entries.reclaim(oldest_used, |r| {
            let meta = &mut buffers[r.buffer_id() as usize];
            meta.hold = meta.hold.saturating_sub(1);
            if meta.state == BufferState::Active {
                shared.clear_slot(r);
                meta.dead += 1;
                if free_lists && !meta.compacting {
                    meta.free_list.push(r.offset());
                }
            }
        });
        self.hold_buffers.reclaim(oldest_used, |buffer_id| {
            trace!(buffer_id, "releasing held buffer");
            shared.release_buffer(buffer_id);
            buffers[buffer_id as usize] = BufferMeta::default();
        });
    }

    pub fn buffer_meta(&self, buffer_id: u32) -> &BufferMeta {
        &self.buffers[buffer_id as usize]
    }

    pub fn active_buffer(&self) -> Option<u32> {
        self.active
    }

    pub fn num_held_entries(&self) -> usize {
        self.hold_entries.len()
    }

    pub fn live_entries(&self) -> u64 {
        self.buffers
            .iter()
            .filter(|meta| meta.state == BufferState::Active)
            .map(|meta| meta.live() as u64)
            .sum()
    }

    fn entry_bytes() -> usize {
        mem::size_of::<T>() + mem::size_of::<Atomic<T>>()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let entry_bytes = Self::entry_bytes();
        let mut usage = MemoryUsage::default();
        for meta in self.buffers.iter() {
            match meta.state {
                BufferState::Free => {}
                BufferState::Active => {
                    usage.allocated_bytes += meta.capacity as usize * entry_bytes;
                    usage.used_bytes += meta.used as usize * entry_bytes;
                    usage.dead_bytes += meta.dead as usize * entry_bytes;
                    usage.allocated_bytes_on_hold += meta.hold as usize * entry_bytes;
                }
                BufferState::Hold => {
                    usage.allocated_bytes += meta.capacity as usize * entry_bytes;
                    usage.allocated_bytes_on_hold += meta.capacity as usize * entry_bytes;
                }
            }
        }
        usage
    }

    pub fn address_space_usage(&self) -> AddressSpace {
        let mut used = 0usize;
        let mut dead = 0usize;
        for meta in self.buffers.iter().filter(|meta| meta.state == BufferState::Active) {
            used += meta.used as usize;
            dead += meta.dead as usize;
        }
        AddressSpace::new(used, dead, MAX_BUFFERS as usize * MAX_ENTRIES_PER_BUFFER as usize)
    }

    /// Pick the buffers with the most dead entries and stop allocating from them.
    pub fn start_compact_worst_buffers(
        &mut self,
        spec: CompactionSpec,
        strategy: &CompactionStrategy,
    ) -> Vec<u32> {
        if !spec.compact() {
            return Vec::new();
        }
        let mut candidates: Vec<(u32, u32)> = self
            .buffers
            .iter()
            .enumerate()
            .filter(|(_, meta)| meta.state == BufferState::Active && !meta.compacting && meta.dead > 1)
            .map(|(id, meta)| (meta.dead, id as u32))
            .collect();
        candidates.sort_unstable_by(|a, b| b.cmp(a));
        let chosen: Vec<u32> = candidates
            .into_iter()
            .take(strategy.max_buffers.max(1))
            .map(|(_, id)| id)
            .collect();
        for &id in &chosen {
            let meta = &mut self.buffers[id as usize];
            meta.compacting = true;
            meta.free_list.clear();
        }
        if let Some(active) = self.active {
            if chosen.contains(&active) {
                self.switch_active_buffer();
            }
        }
        debug!(buffers = ?chosen, memory = spec.memory, address_space = spec.address_space, "compacting data store buffers");
        chosen
    }

    /// Put compacted buffers on hold. Entries in them stay readable until reclaimed.
    pub fn finish_compact(&mut self, buffer_ids: &[u32]) {
        for &id in buffer_ids {
            let meta = &mut self.buffers[id as usize];
            assert!(meta.compacting, "buffer {} was not being compacted", id);
            meta.compacting = false;
            meta.state = BufferState::Hold;
            self.hold_buffers.insert(id);
        }
    }

    pub fn buffer_filter(buffer_ids: &[u32]) -> RoaringBitmap {
        buffer_ids.iter().copied().collect()
    }

    fn reserve_slot(&mut self) -> EntryRef {
        let free_lists = self.free_lists;
        if let Some(id) = self.active {
            let meta = &mut self.buffers[id as usize];
            if free_lists {
                if let Some(offset) = meta.free_list.pop() {
                    meta.dead -= 1;
                    return EntryRef::new(id, offset);
                }
            }
            if meta.used < meta.capacity {
                let offset = meta.used;
                meta.used += 1;
                return EntryRef::new(id, offset);
            }
        }
        let id = self.switch_active_buffer();
        let meta = &mut self.buffers[id as usize];
        let offset = meta.used;
        meta.used += 1;
        EntryRef::new(id, offset)
    }

    fn next_capacity(&self) -> u32 {
        let live = self.live_entries() as f64;
        let wanted = (live * (self.grow.grow_factor - 1.0).max(0.0)) as u64;
        let initial = self.grow.initial_entries.max(2) as u64;
        wanted.clamp(initial, MAX_ENTRIES_PER_BUFFER as u64) as u32
    }

    fn switch_active_buffer(&mut self) -> u32 {
        let capacity = self.next_capacity();
        let id = self
            .buffers
            .iter()
            .position(|meta| meta.state == BufferState::Free)
            .expect("data store ran out of buffer ids") as u32;
        self.shared.install_buffer(id, capacity as usize);
        self.buffers[id as usize] = BufferMeta {
            state: BufferState::Active,
            capacity,
            // Offset 0 is reserved and counted as dead.
            used: 1,
            dead: 1,
            hold: 0,
            compacting: false,
            free_list: Vec::new(),
        };
        trace!(buffer_id = id, capacity, "switched active buffer");
        self.active = Some(id);
        id
    }
}

impl<T: Clone + Send + Sync + 'static> DataStore<T> {
    pub fn get(&self, r: EntryRef) -> Option<T> {
        self.with(r, T::clone)
    }

    /// Copy an entry out of a compacting buffer into the active one.
    pub fn move_entry(&mut self, r: EntryRef) -> EntryRef {
        let value = self
            .get(r)
            .unwrap_or_else(|| panic!("move of missing entry {:?}", r));
        self.allocate(value)
    }
}

/// Read-only handle usable from query threads.
pub struct DataStoreReader<T> {
    shared: Arc<StoreShared<T>>,
}

impl<T> Clone for DataStoreReader<T> {
    fn clone(&self) -> Self {
        DataStoreReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> DataStoreReader<T> {
    pub fn with<R>(&self, r: EntryRef, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.shared.with(r, f)
    }
}

impl<T: Clone> DataStoreReader<T> {
    pub fn get(&self, r: EntryRef) -> Option<T> {
        self.shared.with(r, T::clone)
    }
}
