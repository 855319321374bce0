use std::cmp::Ordering;
use std::sync::Arc;
use crate::datastore::atomic_arc::AtomicArc;
use crate::datastore::entry_ref::EntryRef;
use crate::dictionary::btree::BTree;
use crate::dictionary::comparator::EntryComparator;
use crate::dictionary::hash_table::{self, HashTableReader, Table};

/// Shareable handle readers use to take dictionary snapshots.
#[derive(Clone)]
pub struct DictionaryReader {
    pub(crate) btree: Option<Arc<AtomicArc<BTree>>>,
    pub(crate) hash: Option<HashTableReader>,
    pub(crate) folded: bool,
}

impl DictionaryReader {
    pub fn snapshot(&self) -> DictionarySnapshot {
        DictionarySnapshot {
            btree: self.btree.as_ref().map(|slot| slot.load()),
            hash: self.hash.as_ref().map(|reader| reader.snapshot()),
            folded: self.folded,
        }
    }
}

/// Immutable view of the dictionary as of the last freeze.
///
/// Tree snapshots are frozen roots and never change. Hash snapshots share the live
/// table, whose slots are read atomically.
pub struct DictionarySnapshot {
    btree: Option<Arc<BTree>>,
    hash: Option<Arc<Table>>,
    folded: bool,
}

impl DictionarySnapshot {
    pub fn is_folded(&self) -> bool {
        self.folded
    }

    pub fn find_frozen_index(&self, cmp: &dyn EntryComparator) -> Option<EntryRef> {
        let probe = EntryRef::invalid();
        if let Some(table) = &self.hash {
            return hash_table::table_find(table, cmp.hash(probe), &|k| cmp.equal(k, probe)).map(|(k, _)| k);
        }
        let tree = self.btree.as_ref()?;
        tree.lower_bound(&|k| cmp.less(k, probe))
            .filter(|(k, _)| cmp.equal(*k, probe))
            .map(|(k, _)| k)
    }

    pub fn find_posting_list(&self, cmp: &dyn EntryComparator) -> Option<(EntryRef, EntryRef)> {
        let probe = EntryRef::invalid();
        match (&self.btree, &self.hash) {
            (Some(tree), _) => {
                let found = if self.folded {
                    tree.lower_bound(&|k| cmp.compare_folded(k, probe) == Ordering::Less)
                } else {
                    tree.lower_bound(&|k| cmp.less(k, probe))
                };
                found.filter(|(k, _)| cmp.folded_equal(*k, probe))
            }
            (None, Some(table)) => hash_table::table_find(table, cmp.hash(probe), &|k| cmp.equal(k, probe)),
            (None, None) => None,
        }
    }

    pub fn find_matching_enums(&self, cmp: &dyn EntryComparator) -> Vec<EntryRef> {
        let probe = EntryRef::invalid();
        match (&self.btree, &self.hash) {
            (Some(tree), _) => tree
                .iter_from(&|k| cmp.compare_folded(k, probe) == Ordering::Less)
                .take_while(|(k, _)| cmp.folded_equal(*k, probe))
                .map(|(k, _)| k)
                .collect(),
            (None, Some(table)) => hash_table::table_find_all(table, cmp.hash(probe), &|k| cmp.folded_equal(k, probe))
                .into_iter()
                .map(|(k, _)| k)
                .collect(),
            (None, None) => Vec::new(),
        }
    }

    /// Posting lists holding documents for the probe value. A tree keeps one list per
    /// folded group; a hash-only dictionary keeps one per exact value, so every
    /// folded-equal entry contributes.
    pub fn matching_posting_lists(&self, cmp: &dyn EntryComparator) -> Vec<EntryRef> {
        let probe = EntryRef::invalid();
        let lists: Vec<EntryRef> = match (&self.btree, &self.hash) {
            (Some(_), _) => self.find_posting_list(cmp).map(|(_, d)| d).into_iter().collect(),
            (None, Some(table)) if self.folded => {
                hash_table::table_find_all(table, cmp.hash(probe), &|k| cmp.folded_equal(k, probe))
                    .into_iter()
                    .map(|(_, d)| d)
                    .collect()
            }
            (None, Some(_)) => self.find_posting_list(cmp).map(|(_, d)| d).into_iter().collect(),
            (None, None) => Vec::new(),
        };
        lists.into_iter().filter(|d| d.valid()).collect()
    }

    /// Entries in value order. Hash-only snapshots are sorted on demand.
    pub fn sorted_entries(&self, cmp: &dyn EntryComparator) -> Vec<(EntryRef, EntryRef)> {
        match (&self.btree, &self.hash) {
            (Some(tree), _) => tree.iter().collect(),
            (None, Some(table)) => {
                let mut entries = hash_table::table_entries(table);
                entries.sort_by(|a, b| cmp.compare(a.0, b.0));
                entries
            }
            (None, None) => Vec::new(),
        }
    }

    /// Visit entries from the probe's lower bound in order until `f` returns false.
    pub fn for_each_from(&self, cmp: &dyn EntryComparator, f: &mut dyn FnMut(EntryRef, EntryRef) -> bool) {
        let probe = EntryRef::invalid();
        if let Some(tree) = &self.btree {
            for (k, d) in tree.iter_from(&|k| cmp.less(k, probe)) {
                if !f(k, d) {
                    return;
                }
            }
            return;
        }
        for (k, d) in self.sorted_entries(cmp) {
            if cmp.less(k, probe) {
                continue;
            }
            if !f(k, d) {
                return;
            }
        }
    }

    /// Number of entries in `[low, high)`, each bound given as a comparator probe.
    pub fn count(&self, low: &dyn EntryComparator, high: &dyn EntryComparator) -> usize {
        let probe = EntryRef::invalid();
        let mut count = 0;
        self.for_each_from(low, &mut |k, _| {
            if high.less(k, probe) {
                count += 1;
                true
            } else {
                false
            }
        });
        count
    }

    pub fn len(&self) -> usize {
        match (&self.btree, &self.hash) {
            (Some(tree), _) => tree.len(),
            (None, Some(table)) => hash_table::table_entries(table).len(),
            (None, None) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
