use std::cmp::Ordering;
use std::sync::Arc;
use roaring::RoaringBitmap;
use crate::core::stats::MemoryUsage;
use crate::datastore::atomic_arc::AtomicArc;
use crate::datastore::entry_ref::EntryRef;
use crate::dictionary::btree::BTree;
use crate::dictionary::comparator::EntryComparator;
use crate::dictionary::enum_store_dictionary::{AddResult, EnumStoreDictionary};
use crate::dictionary::read_snapshot::DictionaryReader;

/// Ordered dictionary backing.
///
/// With `folded` set, entries that compare equal under the folded ordering share one
/// payload, attached to the first of them in tree order.
pub struct BTreeDictionary {
    tree: BTree,
    frozen: BTree,
    published: Arc<AtomicArc<BTree>>,
    folded: bool,
}

impl BTreeDictionary {
    pub fn new(folded: bool) -> Self {
        BTreeDictionary {
            tree: BTree::new(),
            frozen: BTree::new(),
            published: Arc::new(AtomicArc::new(Arc::new(BTree::new()))),
            folded,
        }
    }

    pub fn tree(&self) -> &BTree {
        &self.tree
    }

    pub(crate) fn find_exact(tree: &BTree, cmp: &dyn EntryComparator) -> Option<(EntryRef, EntryRef)> {
        let probe = EntryRef::invalid();
        tree.lower_bound(&|k| cmp.less(k, probe))
            .filter(|(k, _)| cmp.equal(*k, probe))
    }

    fn find_owner(&self, tree: &BTree, cmp: &dyn EntryComparator) -> Option<(EntryRef, EntryRef)> {
        let probe = EntryRef::invalid();
        if self.folded {
            tree.lower_bound(&|k| cmp.compare_folded(k, probe) == Ordering::Less)
                .filter(|(k, _)| cmp.folded_equal(*k, probe))
        } else {
            Self::find_exact(tree, cmp)
        }
    }

    /// Insert a fresh key and move the folded group's payload onto it if it now leads.
    pub(crate) fn insert_new(&mut self, cmp: &dyn EntryComparator, entry: EntryRef) {
        self.tree.insert(entry, EntryRef::invalid(), &|k| cmp.less(k, entry));
        if !self.folded {
            return;
        }
        let next = {
            let mut iter = self.tree.iter_from(&|k| cmp.less(k, entry));
            iter.next();
            iter.next()
        };
        if let Some((next_key, payload)) = next {
            if payload.valid() && cmp.folded_equal(next_key, entry) {
                self.tree.update_data(next_key, &|k| cmp.less(k, next_key), &mut |_| EntryRef::invalid());
                self.tree.update_data(entry, &|k| cmp.less(k, entry), &mut |current| {
                    assert!(!current.valid(), "new folded entry {:?} already has payload {:?}", entry, current);
                    payload
                });
            }
        }
    }

    /// Remove a key, handing a leading payload on to the next folded-equal entry.
    pub(crate) fn remove_entry(&mut self, cmp: &dyn EntryComparator, entry: EntryRef) {
        let payload = self
            .tree
            .remove(entry, &|k| cmp.less(k, entry))
            .unwrap_or_else(|| panic!("entry {:?} is not in the dictionary", entry));
        if !payload.valid() {
            return;
        }
        assert!(self.folded, "removing entry {:?} that still owns posting list {:?}", entry, payload);
        let successor = self
            .tree
            .lower_bound(&|k| cmp.compare_folded(k, entry) == Ordering::Less)
            .filter(|(k, _)| cmp.folded_equal(*k, entry));
        match successor {
            Some((next_key, current)) => {
                assert!(
                    !current.valid(),
                    "folded entry {:?} already has payload {:?} while inheriting {:?}",
                    next_key, current, payload
                );
                self.tree.update_data(next_key, &|k| cmp.less(k, next_key), &mut |_| payload);
            }
            None => panic!("posting list {:?} has no folded owner after removing {:?}", payload, entry),
        }
    }

    pub(crate) fn rewrite_keys(&mut self, filter: &RoaringBitmap, mover: &mut dyn FnMut(EntryRef) -> EntryRef) {
        self.tree.rewrite(&mut |k, d| filter.contains(k.buffer_id()).then(|| (mover(k), d)));
    }
}

impl EnumStoreDictionary for BTreeDictionary {
    fn add(&mut self, cmp: &dyn EntryComparator, insert: &mut dyn FnMut() -> EntryRef) -> AddResult {
        if let Some((entry, _)) = Self::find_exact(&self.tree, cmp) {
            return AddResult { entry, inserted: false };
        }
        let entry = insert();
        self.insert_new(cmp, entry);
        AddResult { entry, inserted: true }
    }

    fn remove(&mut self, cmp: &dyn EntryComparator, entry: EntryRef) {
        self.remove_entry(cmp, entry);
    }

    fn find_index(&self, cmp: &dyn EntryComparator) -> Option<EntryRef> {
        Self::find_exact(&self.tree, cmp).map(|(k, _)| k)
    }

    fn find_frozen_index(&self, cmp: &dyn EntryComparator) -> Option<EntryRef> {
        Self::find_exact(&self.frozen, cmp).map(|(k, _)| k)
    }

    fn find_matching_enums(&self, cmp: &dyn EntryComparator) -> Vec<EntryRef> {
        let probe = EntryRef::invalid();
        self.tree
            .iter_from(&|k| cmp.compare_folded(k, probe) == Ordering::Less)
            .take_while(|(k, _)| cmp.folded_equal(*k, probe))
            .map(|(k, _)| k)
            .collect()
    }

    fn find_posting_list(&self, cmp: &dyn EntryComparator, frozen: bool) -> Option<(EntryRef, EntryRef)> {
        let tree = if frozen { &self.frozen } else { &self.tree };
        self.find_owner(tree, cmp)
    }

    fn update_posting_list(
        &mut self,
        entry: EntryRef,
        cmp: &dyn EntryComparator,
        updater: &mut dyn FnMut(EntryRef) -> EntryRef,
    ) {
        let found = self.tree.update_data(entry, &|k| cmp.less(k, entry), updater);
        assert!(found, "posting list update for missing entry {:?}", entry);
    }

    fn clear_all_posting_lists(&mut self, clearer: &mut dyn FnMut(EntryRef)) {
        self.tree.rewrite(&mut |k, d| {
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
        self.tree.rewrite(&mut |k, d| {
            (d.valid() && filter.contains(d.buffer_id())).then(|| (k, normalize(d)))
        })
    }

    fn foreach_posting_list(&self, callback: &mut dyn FnMut(EntryRef), filter: &RoaringBitmap) {
        for (_, d) in self.tree.iter() {
            if d.valid() && filter.contains(d.buffer_id()) {
                callback(d);
            }
        }
    }

    fn free_unused_values(
        &mut self,
        cmp: &dyn EntryComparator,
        is_unused: &dyn Fn(EntryRef) -> bool,
    ) -> Vec<EntryRef> {
        let unused: Vec<EntryRef> = self.tree.iter().map(|(k, _)| k).filter(|&k| is_unused(k)).collect();
        for &entry in &unused {
            self.remove_entry(cmp, entry);
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
                self.remove_entry(cmp, entry);
                freed.push(entry);
            }
        }
        freed
    }

    fn freeze(&mut self) {
        self.frozen = self.tree.clone();
        self.published.store(Arc::new(self.frozen.clone()));
    }

    fn reader(&self) -> DictionaryReader {
        DictionaryReader {
            btree: Some(Arc::clone(&self.published)),
            hash: None,
            folded: self.folded,
        }
    }

    fn move_keys_on_compact(&mut self, filter: &RoaringBitmap, mover: &mut dyn FnMut(EntryRef) -> EntryRef) {
        self.rewrite_keys(filter, mover);
    }

    fn compact_worst(&mut self, btree: bool, _hash: bool, _cmp: &dyn EntryComparator) {
        if btree {
            self.tree = self.tree.compacted();
        }
    }

    fn for_each_entry(&self, f: &mut dyn FnMut(EntryRef, EntryRef)) {
        for (k, d) in self.tree.iter() {
            f(k, d);
        }
    }

    fn build(&mut self, entries: &[(EntryRef, EntryRef)], _cmp: &dyn EntryComparator) {
        self.tree = BTree::from_sorted(entries);
    }

    fn num_uniques(&self) -> usize {
        self.tree.len()
    }

    fn btree_memory_usage(&self) -> MemoryUsage {
        self.tree.memory_usage()
    }

    fn hash_memory_usage(&self) -> MemoryUsage {
        MemoryUsage::default()
    }

    fn has_btree(&self) -> bool {
        true
    }

    fn has_hash(&self) -> bool {
        false
    }

    fn is_folded(&self) -> bool {
        self.folded
    }
}
