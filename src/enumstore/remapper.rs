use std::collections::HashMap;
use roaring::RoaringBitmap;
use crate::enumstore::enum_store::{EnumStore, Index};
use crate::enumstore::value::EnumValue;

/// Result of moving values out of compacted buffers.
///
/// Until `done` both the old and the new refs read the same value. Holders of indexes
/// must rewrite every index whose buffer is in `entry_ref_filter` before calling it.
pub struct EnumIndexRemapper {
    moved: HashMap<Index, Index>,
    filter: RoaringBitmap,
    buffers: Vec<u32>,
}

impl EnumIndexRemapper {
    pub(crate) fn new(moved: HashMap<Index, Index>, filter: RoaringBitmap, buffers: Vec<u32>) -> Self {
        EnumIndexRemapper { moved, filter, buffers }
    }

    /// Bitmap of buffer ids whose entries were moved.
    pub fn entry_ref_filter(&self) -> &RoaringBitmap {
        &self.filter
    }

    pub fn is_affected(&self, idx: Index) -> bool {
        idx.valid() && self.filter.contains(idx.buffer_id())
    }

    pub fn remap(&self, old: Index) -> Index {
        if !self.is_affected(old) {
            return old;
        }
        *self
            .moved
            .get(&old)
            .unwrap_or_else(|| panic!("enum {:?} in a compacted buffer was not moved", old))
    }

    pub fn num_moved(&self) -> usize {
        self.moved.len()
    }

    pub fn compacted_buffers(&self) -> &[u32] {
        &self.buffers
    }

    /// Put the compacted buffers on hold. Old refs stay readable until reclaimed.
    pub fn done<T: EnumValue>(self, store: &mut EnumStore<T>) {
        store.finish_compact(&self.buffers);
    }
}

impl std::fmt::Debug for EnumIndexRemapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnumIndexRemapper")
            .field("moved", &self.moved.len())
            .field("buffers", &self.buffers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{DictionaryConfig, GrowStrategy};
    use crate::core::generation::GenerationHandler;
    use crate::datastore::compaction::CompactionStrategy;

    #[test]
    fn compaction_moves_live_values_and_keeps_old_refs_readable() {
        let mut store: EnumStore<String> = EnumStore::new(
            DictionaryConfig::default(),
            GrowStrategy { initial_entries: 16, grow_factor: 2.0 },
        );
        let handler = GenerationHandler::new();
        let indexes: Vec<Index> = (0..12).map(|i| store.insert(&format!("value{}", i))).collect();
        for &idx in indexes.iter().step_by(2) {
            store.dec_ref_count(idx);
        }
        store.free_unused_values();
        store.assign_generation(handler.current_generation());
        handler.inc_generation();
        store.reclaim_memory(handler.oldest_used_generation());

        let strategy = CompactionStrategy::eager();
        store.update_stat(&strategy);
        let guard = handler.take_guard();
        let remapper = store.consider_compact_values(&strategy).expect("dead values to compact");
        assert_eq!(remapper.num_moved(), 6);

        let live: Vec<Index> = indexes.iter().skip(1).step_by(2).copied().collect();
        for &old in &live {
            assert!(remapper.is_affected(old));
            let new = remapper.remap(old);
            assert_ne!(new, old);
            assert_eq!(store.get_value(new), store.get_value(old));
        }
        let remapped: Vec<Index> = live.iter().map(|&old| remapper.remap(old)).collect();
        remapper.done(&mut store);
        store.freeze_dictionary();
        store.assign_generation(handler.current_generation());
        handler.inc_generation();
        store.reclaim_memory(handler.oldest_used_generation());

        // Still guarded: old refs read their original values.
        assert_eq!(store.try_get_value(live[0]).as_deref(), Some("value1"));
        drop(guard);
        handler.update_oldest_used_generation();
        store.reclaim_memory(handler.oldest_used_generation());
        assert_eq!(store.try_get_value(live[0]), None);
        assert_eq!(store.get_value(remapped[0]), "value1");
        assert_eq!(store.find_index(&"value1".to_string()), Some(remapped[0]));
    }
}
