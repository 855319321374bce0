use roaring::RoaringBitmap;
use crate::core::config::DictionaryConfig;
use crate::core::stats::MemoryUsage;
use crate::datastore::entry_ref::EntryRef;
use crate::dictionary::btree_dictionary::BTreeDictionary;
use crate::dictionary::comparator::EntryComparator;
use crate::dictionary::hash_dictionary::HashDictionary;
use crate::dictionary::hybrid_dictionary::HybridDictionary;
use crate::dictionary::read_snapshot::DictionaryReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddResult {
    pub entry: EntryRef,
    pub inserted: bool,
}

/// Unique value dictionary over entry refs, with an optional payload per entry.
///
/// Lookups by value pass a comparator whose probe stands in for the invalid ref.
/// Writers own the dictionary exclusively; readers go through [`DictionaryReader`].
/// Payloads are posting list refs owned by the posting layer.
pub trait EnumStoreDictionary: Send + Sync {
    /// Find the probe value or insert the ref produced by `insert`.
    fn add(&mut self, cmp: &dyn EntryComparator, insert: &mut dyn FnMut() -> EntryRef) -> AddResult;

    /// Remove an entry whose ref count has dropped to zero. A missing entry is fatal.
    fn remove(&mut self, cmp: &dyn EntryComparator, entry: EntryRef);

    fn find_index(&self, cmp: &dyn EntryComparator) -> Option<EntryRef>;

    /// Lookup against the state published by the last `freeze`.
    fn find_frozen_index(&self, cmp: &dyn EntryComparator) -> Option<EntryRef>;

    /// All entries equal to the probe under the folded ordering.
    fn find_matching_enums(&self, cmp: &dyn EntryComparator) -> Vec<EntryRef>;

    /// `(key, payload)` of the entry owning the posting list for the probe.
    fn find_posting_list(&self, cmp: &dyn EntryComparator, frozen: bool) -> Option<(EntryRef, EntryRef)>;

    fn update_posting_list(
        &mut self,
        entry: EntryRef,
        cmp: &dyn EntryComparator,
        updater: &mut dyn FnMut(EntryRef) -> EntryRef,
    );

    fn clear_all_posting_lists(&mut self, clearer: &mut dyn FnMut(EntryRef));

    /// Rewrite payloads in buffers named by `filter`. Returns whether anything changed.
    fn normalize_posting_lists(
        &mut self,
        normalize: &mut dyn FnMut(EntryRef) -> EntryRef,
        filter: &RoaringBitmap,
    ) -> bool;

    fn foreach_posting_list(&self, callback: &mut dyn FnMut(EntryRef), filter: &RoaringBitmap);

    /// Sweep every entry. Returns the removed keys in removal order.
    fn free_unused_values(
        &mut self,
        cmp: &dyn EntryComparator,
        is_unused: &dyn Fn(EntryRef) -> bool,
    ) -> Vec<EntryRef>;

    /// Sweep the given candidates, which are sorted and without duplicates.
    fn free_unused_values_in(
        &mut self,
        candidates: &[EntryRef],
        cmp: &dyn EntryComparator,
        is_unused: &dyn Fn(EntryRef) -> bool,
    ) -> Vec<EntryRef>;

    /// Publish the current state for readers.
    fn freeze(&mut self);

    fn reader(&self) -> DictionaryReader;

    /// Replace keys living in compacted buffers by the refs `mover` returns.
    fn move_keys_on_compact(&mut self, filter: &RoaringBitmap, mover: &mut dyn FnMut(EntryRef) -> EntryRef);

    fn compact_worst(&mut self, btree: bool, hash: bool, cmp: &dyn EntryComparator);

    /// Visit `(key, payload)` in dictionary order.
    fn for_each_entry(&self, f: &mut dyn FnMut(EntryRef, EntryRef));

    /// Replace the contents. With a tree backing the entries must be sorted.
    fn build(&mut self, entries: &[(EntryRef, EntryRef)], cmp: &dyn EntryComparator);

    fn num_uniques(&self) -> usize;

    fn btree_memory_usage(&self) -> MemoryUsage;

    fn hash_memory_usage(&self) -> MemoryUsage;

    fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.btree_memory_usage();
        usage += self.hash_memory_usage();
        usage
    }

    fn has_btree(&self) -> bool;

    fn has_hash(&self) -> bool;

    /// Whether folded-equal entries share one payload.
    fn is_folded(&self) -> bool;
}

/// Select the dictionary backing for an attribute.
pub fn make_dictionary(config: &DictionaryConfig, folded: bool) -> Box<dyn EnumStoreDictionary> {
    match (config.has_btree(), config.has_hash()) {
        (true, true) => Box::new(HybridDictionary::new(folded)),
        (false, true) => Box::new(HashDictionary::new(folded)),
        _ => Box::new(BTreeDictionary::new(folded)),
    }
}

/// Payload filter that accepts every posting list buffer.
pub fn all_buffers() -> RoaringBitmap {
    let mut filter = RoaringBitmap::new();
    filter.insert_range(0..crate::datastore::entry_ref::MAX_BUFFERS);
    filter
}
