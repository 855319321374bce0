use std::collections::HashMap;
use roaring::RoaringBitmap;
use crate::core::stats::MemoryUsage;
use crate::datastore::entry_ref::EntryRef;
use crate::dictionary::btree_dictionary::BTreeDictionary;
use crate::dictionary::comparator::EntryComparator;
use crate::dictionary::enum_store_dictionary::{AddResult, EnumStoreDictionary};
use crate::dictionary::hash_table::HashTable;
use crate::dictionary::read_snapshot::DictionaryReader;

/// Tree and hash kept in sync over the same keys.
///
/// Exact lookups go to the hash. Ordering, folded grouping and payloads live in the
/// tree; the hash slots carry no payload.
pub struct HybridDictionary {
    btree: BTreeDictionary,
    hash: HashTable,
}

impl HybridDictionary {
    pub fn new(folded: bool) -> Self {
        HybridDictionary {
            btree: BTreeDictionary::new(folded),
            hash: HashTable::new(),
        }
    }

    fn remove_both(&mut self, cmp: &dyn EntryComparator, entry: EntryRef) {
        self.btree.remove_entry(cmp, entry);
        self.hash
            .remove(cmp.hash(entry), entry)
            .unwrap_or_else(|| panic!("entry {:?} missing from hash side of dictionary", entry));
    }
}

impl EnumStoreDictionary for HybridDictionary {
    fn add(&mut self, cmp: &dyn EntryComparator, insert: &mut dyn FnMut() -> EntryRef) -> AddResult {
        let probe = EntryRef::invalid();
        let hash = cmp.hash(probe);
        if let Some((entry, _)) = self.hash.find(hash, &|k| cmp.equal(k, probe)) {
            return AddResult { entry, inserted: false };
        }
        let entry = insert();
        self.btree.insert_new(cmp, entry);
        self.hash.insert(hash, entry, EntryRef::invalid(), &mut |k| cmp.hash(k));
        AddResult { entry, inserted: true }
    }

    fn remove(&mut self, cmp: &dyn EntryComparator, entry: EntryRef) {
        self.remove_both(cmp, entry);
    }

    fn find_index(&self, cmp: &dyn EntryComparator) -> Option<EntryRef> {
        let probe = EntryRef::invalid();
        self.hash.find(cmp.hash(probe), &|k| cmp.equal(k, probe)).map(|(k, _)| k)
    }

    fn find_frozen_index(&self, cmp: &dyn EntryComparator) -> Option<EntryRef> {
        self.find_index(cmp)
    }

    fn find_matching_enums(&self, cmp: &dyn EntryComparator) -> Vec<EntryRef> {
        self.btree.find_matching_enums(cmp)
    }

    fn find_posting_list(&self, cmp: &dyn EntryComparator, frozen: bool) -> Option<(EntryRef, EntryRef)> {
        self.btree.find_posting_list(cmp, frozen)
    }

    fn update_posting_list(
        &mut self,
        entry: EntryRef,
        cmp: &dyn EntryComparator,
        updater: &mut dyn FnMut(EntryRef) -> EntryRef,
    ) {
        self.btree.update_posting_list(entry, cmp, updater);
    }

    fn clear_all_posting_lists(&mut self, clearer: &mut dyn FnMut(EntryRef)) {
        self.btree.clear_all_posting_lists(clearer);
    }

    fn normalize_posting_lists(
        &mut self,
        normalize: &mut dyn FnMut(EntryRef) -> EntryRef,
        filter: &RoaringBitmap,
    ) -> bool {
        self.btree.normalize_posting_lists(normalize, filter)
    }

    fn foreach_posting_list(&self, callback: &mut dyn FnMut(EntryRef), filter: &RoaringBitmap) {
        self.btree.foreach_posting_list(callback, filter);
    }

    fn free_unused_values(
        &mut self,
        cmp: &dyn EntryComparator,
        is_unused: &dyn Fn(EntryRef) -> bool,
    ) -> Vec<EntryRef> {
        let unused: Vec<EntryRef> = self.btree.tree().iter().map(|(k, _)| k).filter(|&k| is_unused(k)).collect();
        for &entry in &unused {
            self.remove_both(cmp, entry);
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
                self.remove_both(cmp, entry);
                freed.push(entry);
            }
        }
        freed
    }

    fn freeze(&mut self) {
        self.btree.freeze();
    }

    fn reader(&self) -> DictionaryReader {
        let mut reader = self.btree.reader();
        reader.hash = Some(self.hash.reader());
        reader
    }

    fn move_keys_on_compact(&mut self, filter: &RoaringBitmap, mover: &mut dyn FnMut(EntryRef) -> EntryRef) {
        let mut moved: HashMap<EntryRef, EntryRef> = HashMap::new();
        self.btree.rewrite_keys(filter, &mut |old| {
            let new = mover(old);
            moved.insert(old, new);
            new
        });
        if moved.is_empty() {
            return;
        }
        self.hash.rewrite(&mut |k, d| moved.get(&k).map(|&new| (new, d)));
    }

    fn compact_worst(&mut self, btree: bool, hash: bool, cmp: &dyn EntryComparator) {
        self.btree.compact_worst(btree, false, cmp);
        if hash {
            let capacity = self.hash.capacity();
            self.hash.rehash(capacity, &mut |k| cmp.hash(k));
        }
    }

    fn for_each_entry(&self, f: &mut dyn FnMut(EntryRef, EntryRef)) {
        self.btree.for_each_entry(f);
    }

    fn build(&mut self, entries: &[(EntryRef, EntryRef)], cmp: &dyn EntryComparator) {
        self.btree.build(entries, cmp);
        self.hash = HashTable::new();
        self.hash.rehash(entries.len() * 2, &mut |k| cmp.hash(k));
        for &(key, _) in entries {
            self.hash.insert(cmp.hash(key), key, EntryRef::invalid(), &mut |k| cmp.hash(k));
        }
    }

    fn num_uniques(&self) -> usize {
        self.btree.num_uniques()
    }

    fn btree_memory_usage(&self) -> MemoryUsage {
        self.btree.btree_memory_usage()
    }

    fn hash_memory_usage(&self) -> MemoryUsage {
        self.hash.memory_usage()
    }

    fn has_btree(&self) -> bool {
        true
    }

    fn has_hash(&self) -> bool {
        true
    }

    fn is_folded(&self) -> bool {
        self.btree.is_folded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::comparator::test_support::MapComparator;

    #[test]
    fn both_sides_follow_adds_removes_and_moves() {
        let mut values = HashMap::new();
        let mut dict = HybridDictionary::new(false);
        for i in 1..=20u32 {
            let r = EntryRef::new(1, i);
            values.insert(r, format!("{:02}", i));
            let cmp = MapComparator::probe(&values, false, &format!("{:02}", i));
            dict.add(&cmp, &mut || r);
        }
        let cmp = MapComparator::probe(&values, false, "07");
        assert_eq!(dict.find_index(&cmp), Some(EntryRef::new(1, 7)));

        // Move every key from buffer 1 to buffer 2.
        for i in 1..=20u32 {
            let v = values[&EntryRef::new(1, i)].clone();
            values.insert(EntryRef::new(2, i), v);
        }
        let filter: RoaringBitmap = [1u32].into_iter().collect();
        dict.move_keys_on_compact(&filter, &mut |old| EntryRef::new(2, old.offset()));
        let cmp = MapComparator::probe(&values, false, "07");
        assert_eq!(dict.find_index(&cmp), Some(EntryRef::new(2, 7)));
        let mut ordered = Vec::new();
        dict.for_each_entry(&mut |k, _| ordered.push(k.buffer_id()));
        assert!(ordered.iter().all(|&b| b == 2));

        let cmp = MapComparator::new(&values, false);
        let freed = dict.free_unused_values(&cmp, &|k| k.offset() > 10);
        assert_eq!(freed.len(), 10);
        assert_eq!(dict.num_uniques(), 10);
        let cmp = MapComparator::probe(&values, false, "15");
        assert_eq!(dict.find_index(&cmp), None);
    }
}
