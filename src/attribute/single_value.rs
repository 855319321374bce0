use crate::datastore::entry_ref::EntryRef;
use crate::datastore::rcu_vector::{RcuReader, RcuVector};
use crate::enumstore::enum_store::Index;
use crate::enumstore::remapper::EnumIndexRemapper;

/// One enum index per document.
pub struct SingleValueMapping {
    indices: RcuVector,
}

impl SingleValueMapping {
    pub fn new() -> Self {
        SingleValueMapping {
            indices: RcuVector::new(),
        }
    }

    pub fn num_docs(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn add_doc(&mut self, idx: Index) -> u32 {
        self.indices.push(idx.raw());
        self.indices.len() as u32 - 1
    }

    pub fn get(&self, doc_id: u32) -> Index {
        EntryRef::from_raw(self.indices.get(doc_id as usize))
    }

    /// Returns the replaced index.
    pub fn set(&mut self, doc_id: u32, idx: Index) -> Index {
        let old = self.get(doc_id);
        self.indices.set(doc_id as usize, idx.raw());
        old
    }

    /// Rewrite every index the remapper moved. Returns how many documents changed.
    pub fn remap(&mut self, remapper: &EnumIndexRemapper) -> usize {
        let mut changed = 0;
        for doc_id in 0..self.indices.len() {
            let old = EntryRef::from_raw(self.indices.get(doc_id));
            if remapper.is_affected(old) {
                self.indices.set(doc_id, remapper.remap(old).raw());
                changed += 1;
            }
        }
        changed
    }

    pub fn reader(&self) -> RcuReader {
        self.indices.reader()
    }

    pub fn memory_bytes(&self) -> usize {
        self.indices.memory_bytes()
    }
}

impl Default for SingleValueMapping {
    fn default() -> Self {
        Self::new()
    }
}
