use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use crate::core::stats::MemoryUsage;
use crate::datastore::atomic_arc::AtomicArc;
use crate::datastore::entry_ref::EntryRef;

const EMPTY: u32 = 0;
const TOMBSTONE: u32 = u32::MAX;
const MIN_CAPACITY: usize = 16;

struct Slot {
    key: AtomicU32,
    payload: AtomicU32,
}

/// Open-addressed table with linear probing. Keys and payloads are single atomic
/// words so readers probe without locks while the writer stores into them.
pub struct Table {
    slots: Box<[Slot]>,
}

impl Table {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        Table {
            slots: (0..capacity)
                .map(|_| Slot {
                    key: AtomicU32::new(EMPTY),
                    payload: AtomicU32::new(0),
                })
                .collect(),
        }
    }

    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// Walk the probe chain for `hash`, stopping at the first empty slot.
    fn probe(&self, hash: u64, mut f: impl FnMut(usize, u32) -> bool) {
        let mask = self.mask();
        let mut pos = hash as usize & mask;
        for _ in 0..self.slots.len() {
            let key = self.slots[pos].key.load(Ordering::Acquire);
            if key == EMPTY || !f(pos, key) {
                return;
            }
            pos = (pos + 1) & mask;
        }
    }

    fn find(&self, hash: u64, is_match: &dyn Fn(EntryRef) -> bool) -> Option<(usize, EntryRef, EntryRef)> {
        let mut found = None;
        self.probe(hash, |pos, key| {
            if key != TOMBSTONE && is_match(EntryRef::from_raw(key)) {
                let payload = self.slots[pos].payload.load(Ordering::Acquire);
                found = Some((pos, EntryRef::from_raw(key), EntryRef::from_raw(payload)));
                return false;
            }
            true
        });
        found
    }

    fn find_all(&self, hash: u64, is_match: &dyn Fn(EntryRef) -> bool) -> Vec<(EntryRef, EntryRef)> {
        let mut found = Vec::new();
        self.probe(hash, |pos, key| {
            if key != TOMBSTONE && is_match(EntryRef::from_raw(key)) {
                let payload = self.slots[pos].payload.load(Ordering::Acquire);
                found.push((EntryRef::from_raw(key), EntryRef::from_raw(payload)));
            }
            true
        });
        found
    }

    fn for_each(&self, mut f: impl FnMut(EntryRef, EntryRef)) {
        for slot in self.slots.iter() {
            let key = slot.key.load(Ordering::Acquire);
            if key != EMPTY && key != TOMBSTONE {
                f(EntryRef::from_raw(key), EntryRef::from_raw(slot.payload.load(Ordering::Acquire)));
            }
        }
    }

    fn place(&self, hash: u64, key: EntryRef, payload: EntryRef) -> bool {
        let mask = self.mask();
        let mut pos = hash as usize & mask;
        loop {
            let current = self.slots[pos].key.load(Ordering::Relaxed);
            if current == EMPTY || current == TOMBSTONE {
                // Payload first so a reader that sees the key sees its payload.
                self.slots[pos].payload.store(payload.raw(), Ordering::Release);
                self.slots[pos].key.store(key.raw(), Ordering::Release);
                return current == TOMBSTONE;
            }
            pos = (pos + 1) & mask;
        }
    }
}

/// Writer side of the hash dictionary backing.
pub struct HashTable {
    shared: Arc<AtomicArc<Table>>,
    table: Arc<Table>,
    len: usize,
    tombstones: usize,
}

impl HashTable {
    pub fn new() -> Self {
        let table = Arc::new(Table::with_capacity(MIN_CAPACITY));
        HashTable {
            shared: Arc::new(AtomicArc::new(Arc::clone(&table))),
            table,
            len: 0,
            tombstones: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.table.slots.len()
    }

    pub fn reader(&self) -> HashTableReader {
        HashTableReader {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn find(&self, hash: u64, is_match: &dyn Fn(EntryRef) -> bool) -> Option<(EntryRef, EntryRef)> {
        self.table.find(hash, is_match).map(|(_, key, payload)| (key, payload))
    }

    pub fn find_all(&self, hash: u64, is_match: &dyn Fn(EntryRef) -> bool) -> Vec<(EntryRef, EntryRef)> {
        self.table.find_all(hash, is_match)
    }

    /// Insert a key known to be absent. `hash_of` rehashes existing keys on growth.
    pub fn insert(&mut self, hash: u64, key: EntryRef, payload: EntryRef, hash_of: &mut dyn FnMut(EntryRef) -> u64) {
        assert!(key.valid() && key.raw() != TOMBSTONE, "cannot insert {:?} into hash dictionary", key);
        if (self.len + self.tombstones + 1) * 2 > self.capacity() {
            let wanted = (self.len + 1) * 4;
            self.rehash(wanted, hash_of);
        }
        if self.table.place(hash, key, payload) {
            self.tombstones -= 1;
        }
        self.len += 1;
    }

    pub fn remove(&mut self, hash: u64, key: EntryRef) -> Option<EntryRef> {
        let (pos, _, payload) = self.table.find(hash, &|k| k == key)?;
        let slot = &self.table.slots[pos];
        slot.key.store(TOMBSTONE, Ordering::Release);
        slot.payload.store(0, Ordering::Release);
        self.len -= 1;
        self.tombstones += 1;
        Some(payload)
    }

    pub fn update_payload(&mut self, hash: u64, key: EntryRef, f: &mut dyn FnMut(EntryRef) -> EntryRef) -> bool {
        match self.table.find(hash, &|k| k == key) {
            Some((pos, _, payload)) => {
                let updated = f(payload);
                self.table.slots[pos].payload.store(updated.raw(), Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn for_each(&self, f: impl FnMut(EntryRef, EntryRef)) {
        self.table.for_each(f);
    }

    /// Visit every live slot; a returned pair replaces key and payload in place.
    /// Replacement keys must hash like the keys they replace.
    pub fn rewrite(&mut self, f: &mut dyn FnMut(EntryRef, EntryRef) -> Option<(EntryRef, EntryRef)>) -> bool {
        let mut changed = false;
        for slot in self.table.slots.iter() {
            let key = slot.key.load(Ordering::Relaxed);
            if key == EMPTY || key == TOMBSTONE {
                continue;
            }
            let payload = slot.payload.load(Ordering::Relaxed);
            if let Some((new_key, new_payload)) = f(EntryRef::from_raw(key), EntryRef::from_raw(payload)) {
                if new_payload.raw() != payload {
                    slot.payload.store(new_payload.raw(), Ordering::Release);
                    changed = true;
                }
                if new_key.raw() != key {
                    slot.key.store(new_key.raw(), Ordering::Release);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Copy live entries into a fresh table and publish it. Readers holding the old
    /// table keep probing it until they reload.
    pub fn rehash(&mut self, capacity: usize, hash_of: &mut dyn FnMut(EntryRef) -> u64) {
        let fresh = Table::with_capacity(capacity.max(self.len * 2));
        let mut moved = 0;
        self.table.for_each(|key, payload| {
            fresh.place(hash_of(key), key, payload);
            moved += 1;
        });
        debug_assert_eq!(moved, self.len);
        let fresh = Arc::new(fresh);
        self.shared.store(Arc::clone(&fresh));
        self.table = fresh;
        self.tombstones = 0;
    }

    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let slot_bytes = std::mem::size_of::<Slot>();
        MemoryUsage::new(
            self.capacity() * slot_bytes,
            (self.len + self.tombstones) * slot_bytes,
            self.tombstones * slot_bytes,
            0,
        )
    }

    pub fn snapshot(&self) -> Arc<Table> {
        Arc::clone(&self.table)
    }
}

impl Default for HashTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock-free read handle for another thread.
#[derive(Clone)]
pub struct HashTableReader {
    shared: Arc<AtomicArc<Table>>,
}

impl HashTableReader {
    pub fn snapshot(&self) -> Arc<Table> {
        self.shared.load()
    }
}

/// Read helpers shared by writer and reader snapshots.
pub fn table_find(table: &Table, hash: u64, is_match: &dyn Fn(EntryRef) -> bool) -> Option<(EntryRef, EntryRef)> {
    table.find(hash, is_match).map(|(_, key, payload)| (key, payload))
}

pub fn table_find_all(table: &Table, hash: u64, is_match: &dyn Fn(EntryRef) -> bool) -> Vec<(EntryRef, EntryRef)> {
    table.find_all(hash, is_match)
}

pub fn table_entries(table: &Table) -> Vec<(EntryRef, EntryRef)> {
    let mut entries = Vec::new();
    table.for_each(|key, payload| entries.push((key, payload)));
    entries
}
