use crate::core::config::GrowStrategy;
use crate::core::generation::Generation;
use crate::core::stats::MemoryUsage;
use crate::datastore::array_store::{ArrayStore, ArrayStoreReader};
use crate::datastore::compaction::CompactionStrategy;
use crate::datastore::entry_ref::EntryRef;
use crate::datastore::rcu_vector::{RcuReader, RcuVector};
use crate::enumstore::enum_store::Index;
use crate::enumstore::remapper::EnumIndexRemapper;

/// One value slot of a multi-value document. Arrays carry weight 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightedIndex {
    pub index: Index,
    pub weight: i32,
}

impl WeightedIndex {
    pub fn new(index: Index, weight: i32) -> Self {
        WeightedIndex { index, weight }
    }
}

/// Per-document arrays of enum indexes.
///
/// A document's array is immutable once published. Setting new values stores a new
/// array and holds the old one until readers have moved on.
pub struct MultiValueMapping {
    refs: RcuVector,
    arrays: ArrayStore<WeightedIndex>,
    total_values: u64,
}

impl MultiValueMapping {
    pub fn new(grow: GrowStrategy) -> Self {
        MultiValueMapping {
            refs: RcuVector::new(),
            arrays: ArrayStore::new(grow),
            total_values: 0,
        }
    }

    pub fn num_docs(&self) -> u32 {
        self.refs.len() as u32
    }

    pub fn total_values(&self) -> u64 {
        self.total_values
    }

    pub fn add_doc(&mut self) -> u32 {
        self.refs.push(EntryRef::invalid().raw());
        self.refs.len() as u32 - 1
    }

    pub fn get(&self, doc_id: u32) -> Vec<WeightedIndex> {
        self.arrays.get(EntryRef::from_raw(self.refs.get(doc_id as usize)))
    }

    /// Replace a document's values. Returns the old values.
    pub fn set(&mut self, doc_id: u32, values: &[WeightedIndex]) -> Vec<WeightedIndex> {
        let old_ref = EntryRef::from_raw(self.refs.get(doc_id as usize));
        let old = self.arrays.get(old_ref);
        let new_ref = self.arrays.add(values);
        self.refs.set(doc_id as usize, new_ref.raw());
        self.arrays.remove(old_ref);
        self.total_values = self.total_values + values.len() as u64 - old.len() as u64;
        old
    }

    /// Rewrite arrays holding moved enum indexes. Returns how many documents changed.
    pub fn remap(&mut self, remapper: &EnumIndexRemapper) -> usize {
        let mut changed = 0;
        for doc_id in 0..self.num_docs() {
            let values = self.get(doc_id);
            if !values.iter().any(|v| remapper.is_affected(v.index)) {
                continue;
            }
            let remapped: Vec<WeightedIndex> = values
                .iter()
                .map(|v| WeightedIndex::new(remapper.remap(v.index), v.weight))
                .collect();
            self.set(doc_id, &remapped);
            changed += 1;
        }
        changed
    }

    /// Move arrays out of the array store's worst buffers.
    pub fn compact_worst(&mut self, strategy: &CompactionStrategy) -> bool {
        let spec = self.arrays.should_compact(strategy);
        let buffers = self.arrays.start_compact(spec, strategy);
        if buffers.is_empty() {
            return false;
        }
        for doc_id in 0..self.refs.len() {
            let r = EntryRef::from_raw(self.refs.get(doc_id));
            if r.valid() && buffers.contains(&r.buffer_id()) {
                let moved = self.arrays.move_entry(r);
                self.refs.set(doc_id, moved.raw());
            }
        }
        self.arrays.finish_compact(&buffers);
        true
    }

    pub fn assign_generation(&mut self, current: Generation) {
        self.arrays.assign_generation(current);
    }

    pub fn reclaim_memory(&mut self, oldest_used: Generation) {
        self.arrays.reclaim_memory(oldest_used);
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.arrays.memory_usage();
        usage.allocated_bytes += self.refs.memory_bytes();
        usage.used_bytes += self.refs.len() * std::mem::size_of::<u32>();
        usage
    }

    pub fn reader(&self) -> MultiValueReader {
        MultiValueReader {
            refs: self.refs.reader(),
            arrays: self.arrays.reader(),
        }
    }
}

#[derive(Clone)]
pub struct MultiValueReader {
    refs: RcuReader,
    arrays: ArrayStoreReader<WeightedIndex>,
}

impl MultiValueReader {
    pub fn refs(&self) -> &RcuReader {
        &self.refs
    }

    pub fn array(&self, r: EntryRef) -> Vec<WeightedIndex> {
        self.arrays.get(r)
    }
}
