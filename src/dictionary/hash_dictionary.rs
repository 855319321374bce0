use roaring::RoaringBitmap;
use crate::core::stats::MemoryUsage;
use crate::datastore::entry_ref::EntryRef;
use crate::dictionary::comparator::EntryComparator;
use crate::dictionary::enum_store_dictionary::{AddResult, EnumStoreDictionary};
use crate::dictionary::hash_table::HashTable;
use crate::dictionary::read_snapshot::DictionaryReader;

/// Hash-only dictionary backing. Every entry carries its own payload; there is no
/// order, so folded matching walks the probe chain of the folded hash.
pub struct HashDictionary {
    table: HashTable,
    folded: bool,
}

impl HashDictionary {
    pub fn new(folded: bool) -> Self {
        HashDictionary {
            table: HashTable::new(),
            folded,
        }
    }
}

impl EnumStoreDictionary for HashDictionary {
    fn add(&mut self, cmp: &dyn EntryComparator, insert: &mut dyn FnMut() -> EntryRef) -> AddResult {
        let probe = EntryRef::invalid();
        let hash = cmp.hash(probe);
        if let Some((entry, _)) = self.table.find(hash, &|k| cmp.equal(k, probe)) {
            return AddResult { entry, inserted: false };
        }
        let entry = insert();
        self.table.insert(hash, entry, EntryRef::invalid(), &mut |k| cmp.hash(k));
        AddResult { entry, inserted: true }
    }

    fn remove(&mut self, cmp: &dyn EntryComparator, entry: EntryRef) {
        let payload = self
            .table
            .remove(cmp.hash(entry), entry)
            .unwrap_or_else(|| panic!("entry {:?} is not in the dictionary", entry));
        assert!(!payload.valid(), "removing entry {:?} that still owns posting list {:?}", entry, payload);
    }

    fn find_index(&self, cmp: &dyn EntryComparator) -> Option<EntryRef> {
        let probe = EntryRef::invalid();
        self.table.find(cmp.hash(probe), &|k| cmp.equal(k, probe)).map(|(k, _)| k)
    }

    fn find_frozen_index(&self, cmp: &dyn EntryComparator) -> Option<EntryRef> {
        self.find_index(cmp)
    }

    fn find_matching_enums(&self, cmp: &dyn EntryComparator) -> Vec<EntryRef> {
        let probe = EntryRef::invalid();
        self.table
            .find_all(cmp.hash(probe), &|k| cmp.folded_equal(k, probe))
            .into_iter()
            .map(|(k, _)| k)
            .collect()
    }

    // Exact match only: without a tree there is no folded group owner.
    fn find_posting_list(&self, cmp: &dyn EntryComparator, _frozen: bool) -> Option<(EntryRef, EntryRef)> {
        let probe = EntryRef::invalid();
        self.table.find(cmp.hash(probe), &|k| cmp.equal(k, probe))
    }

    fn update_posting_list(
        &mut self,
        entry: EntryRef,
        cmp: &dyn EntryComparator,
        updater: &mut dyn FnMut(EntryRef) -> EntryRef,
    ) {
        let found = self.table.update_payload(cmp.hash(entry), entry, updater);
        assert!(found, "posting list update for missing entry {:?}", entry);
    }

    fn clear_all_posting_lists(&mut self, clearer: &mut dyn FnMut(EntryRef)) {
        self.table.rewrite(&mut |k, d| {
            if d.valid() {
                clearer(d);
                Some((k, EntryRef::invalid()))
            } else {
                None
            }
        });
    }

    fn normalize_posting_lists(
        &mut self,
        normalize: &mut dyn FnMut(EntryRef) -> EntryRef,
        filter: &RoaringBitmap,
    ) -> bool {
        self.table
            .rewrite(&mut |k, d| (d.valid() && filter.contains(d.buffer_id())).then(|| (k, normalize(d))))
    }

    fn foreach_posting_list(&self, callback: &mut dyn FnMut(EntryRef), filter: &RoaringBitmap) {
        self.table.for_each(|_, d| {
            if d.valid() && filter.contains(d.buffer_id()) {
                callback(d);
            }
        });
    }

    fn free_unused_values(
        &mut self,
        cmp: &dyn EntryComparator,
        is_unused: &dyn Fn(EntryRef) -> bool,
    ) -> Vec<EntryRef> {
        let mut unused = Vec::new();
        self.table.for_each(|k, _| {
            if is_unused(k) {
                unused.push(k);
            }
        });
        unused.sort_unstable();
        for &entry in &unused {
            self.remove(cmp, entry);
        }
        unused
    }

    fn free_unused_values_in(
        &mut self,
        candidates: &[EntryRef],
        cmp: &dyn EntryComparator,
        is_unused: &dyn Fn(EntryRef) -> bool,
    ) -> Vec<EntryRef> {
        let mut freed = Vec::new();
        for &entry in candidates {
            if is_unused(entry) {
                self.remove(cmp, entry);
                freed.push(entry);
            }
        }
        freed
    }

    fn freeze(&mut self) {}

    fn reader(&self) -> DictionaryReader {
        DictionaryReader {
            btree: None,
            hash: Some(self.table.reader()),
            folded: self.folded,
        }
    }

    fn move_keys_on_compact(&mut self, filter: &RoaringBitmap, mover: &mut dyn FnMut(EntryRef) -> EntryRef) {
        self.table.rewrite(&mut |k, d| filter.contains(k.buffer_id()).then(|| (mover(k), d)));
    }

    fn compact_worst(&mut self, _btree: bool, hash: bool, cmp: &dyn EntryComparator) {
        if hash {
            let capacity = self.table.capacity();
            self.table.rehash(capacity, &mut |k| cmp.hash(k));
        }
    }

    fn for_each_entry(&self, f: &mut dyn FnMut(EntryRef, EntryRef)) {
        self.table.for_each(|k, d| f(k, d));
    }

    fn build(&mut self, entries: &[(EntryRef, EntryRef)], cmp: &dyn EntryComparator) {
        self.table = HashTable::new();
        self.table.rehash(entries.len() * 2, &mut |k| cmp.hash(k));
        for &(key, payload) in entries {
            self.table.insert(cmp.hash(key), key, payload, &mut |k| cmp.hash(k));
        }
    }

    fn num_uniques(&self) -> usize {
        self.table.len()
    }

    fn btree_memory_usage(&self) -> MemoryUsage {
        MemoryUsage::default()
    }

    fn hash_memory_usage(&self) -> MemoryUsage {
        self.table.memory_usage()
    }

    fn has_btree(&self) -> bool {
        false
    }

    fn has_hash(&self) -> bool {
        true
    }

    fn is_folded(&self) -> bool {
        self.folded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use crate::dictionary::comparator::test_support::MapComparator;

    #[test]
    fn folded_matching_walks_the_probe_chain() {
        let mut values = HashMap::new();
        let mut dict = HashDictionary::new(true);
        for (i, v) in ["Apple", "apple", "pear", "APPLE"].iter().enumerate() {
            let r = EntryRef::new(1, i as u32 + 1);
            values.insert(r, v.to_string());
            let cmp = MapComparator::probe(&values, true, v);
            assert!(dict.add(&cmp, &mut || r).inserted);
        }
        let cmp = MapComparator::probe(&values, true, "aPPle");
        assert_eq!(dict.find_matching_enums(&cmp).len(), 3);
        assert!(dict.find_index(&cmp).is_none());
        let cmp = MapComparator::probe(&values, true, "pear");
        assert_eq!(dict.find_index(&cmp), Some(EntryRef::new(1, 3)));
        assert_eq!(dict.reader().snapshot().find_frozen_index(&cmp), Some(EntryRef::new(1, 3)));
    }

    #[test]
    fn uncased_posting_lists_are_not_shared() {
        let mut values = HashMap::new();
        let mut dict = HashDictionary::new(true);
        for (i, v) in ["Apple", "apple"].iter().enumerate() {
            let r = EntryRef::new(1, i as u32 + 1);
            values.insert(r, v.to_string());
            dict.add(&MapComparator::probe(&values, true, v), &mut || r);
        }
        let cmp = MapComparator::new(&values, true);
        dict.update_posting_list(EntryRef::new(1, 1), &cmp, &mut |_| EntryRef::new(5, 1));
        dict.update_posting_list(EntryRef::new(1, 2), &cmp, &mut |_| EntryRef::new(5, 2));

        // Each case variant keeps its own list; lookups are exact.
        let find = |v: &str| dict.find_posting_list(&MapComparator::probe(&values, true, v), false);
        assert_eq!(find("Apple"), Some((EntryRef::new(1, 1), EntryRef::new(5, 1))));
        assert_eq!(find("apple"), Some((EntryRef::new(1, 2), EntryRef::new(5, 2))));
        assert_eq!(find("APPLE"), None);
    }

    #[test]
    fn payload_and_sweep() {
        let mut values = HashMap::new();
        let mut dict = HashDictionary::new(false);
        for i in 1..=50u32 {
            let r = EntryRef::new(1, i);
            values.insert(r, format!("v{}", i));
            let cmp = MapComparator::probe(&values, false, &format!("v{}", i));
            dict.add(&cmp, &mut || r);
        }
        let cmp = MapComparator::new(&values, false);
        dict.update_posting_list(EntryRef::new(1, 10), &cmp, &mut |_| EntryRef::new(5, 1));
        let mut seen = Vec::new();
        dict.foreach_posting_list(&mut |p| seen.push(p), &crate::dictionary::enum_store_dictionary::all_buffers());
        assert_eq!(seen, vec![EntryRef::new(5, 1)]);

        let freed = dict.free_unused_values(&cmp, &|k| k.offset() % 2 == 1);
        assert_eq!(freed.len(), 25);
        assert_eq!(dict.num_uniques(), 25);
        dict.compact_worst(false, true, &cmp);
        assert_eq!(dict.hash_memory_usage().dead_bytes, 0);
        assert_eq!(dict.num_uniques(), 25);
    }
}
