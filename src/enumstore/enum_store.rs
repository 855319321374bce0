use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use bytes::BytesMut;
use roaring::RoaringBitmap;
use tracing::debug;
use crate::core::config::{AttributeConfig, DictionaryConfig, GrowStrategy, Matching};
use crate::core::generation::Generation;
use crate::core::stats::{AddressSpace, MemoryUsage};
use crate::datastore::compaction::{CompactionSpec, CompactionStrategy};
use crate::datastore::data_store::{DataStore, DataStoreReader};
use crate::datastore::entry_ref::EntryRef;
use crate::dictionary::enum_store_dictionary::{EnumStoreDictionary, make_dictionary};
use crate::enumstore::batch_updater::BatchUpdater;
use crate::enumstore::comparator::EnumComparator;
use crate::enumstore::enumerator::Enumerator;
use crate::enumstore::read_guard::EnumStoreReader;
use crate::enumstore::remapper::EnumIndexRemapper;
use crate::enumstore::value::EnumValue;

/// Handle type handed to attribute layers.
pub type Index = EntryRef;

/// Raw form of an [`Index`], used where an integer handle is wanted (query terms).
pub type EnumHandle = u32;

/// One distinct value with the number of references to it.
pub struct EnumEntry<T> {
    pub value: T,
    ref_count: AtomicU32,
}

impl<T> EnumEntry<T> {
    pub fn new(value: T) -> Self {
        EnumEntry {
            value,
            ref_count: AtomicU32::new(0),
        }
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Clone for EnumEntry<T> {
    fn clone(&self) -> Self {
        EnumEntry {
            value: self.value.clone(),
            ref_count: AtomicU32::new(self.ref_count()),
        }
    }
}

/// What `update_stat` decided should be compacted on the next opportunity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumCompactionSpec {
    pub values: CompactionSpec,
    pub btree_dictionary: bool,
    pub hash_dictionary: bool,
}

/// Deduplicating, reference-counted value store backed by an arena and a dictionary.
///
/// Exactly one writer mutates the store. Query threads read through
/// [`EnumStoreReader`] snapshots guarded by a generation.
pub struct EnumStore<T: EnumValue> {
    pub(crate) store: DataStore<EnumEntry<T>>,
    pub(crate) reader: DataStoreReader<EnumEntry<T>>,
    pub(crate) dict: Box<dyn EnumStoreDictionary>,
    pub(crate) folded: bool,
    compaction_spec: EnumCompactionSpec,
    cached_values_memory: MemoryUsage,
    cached_dictionary_memory: MemoryUsage,
}

impl<T: EnumValue> EnumStore<T> {
    pub fn new(dictionary: DictionaryConfig, grow: GrowStrategy) -> Self {
        let folded = T::is_foldable() && dictionary.matching == Matching::Uncased;
        let store = DataStore::new(grow);
        let reader = store.reader();
        EnumStore {
            store,
            reader,
            dict: make_dictionary(&dictionary, folded),
            folded,
            compaction_spec: EnumCompactionSpec::default(),
            cached_values_memory: MemoryUsage::default(),
            cached_dictionary_memory: MemoryUsage::default(),
        }
    }

    pub fn from_config(config: &AttributeConfig) -> Self {
        Self::new(config.dictionary, config.grow)
    }

    pub fn is_folded(&self) -> bool {
        self.folded
    }

    pub fn comparator(&self) -> EnumComparator<'_, T> {
        EnumComparator::new(&self.reader, self.folded)
    }

    pub fn probe_comparator<'a>(&'a self, value: &'a T) -> EnumComparator<'a, T> {
        EnumComparator::with_probe(&self.reader, self.folded, value)
    }

    pub fn dictionary(&self) -> &dyn EnumStoreDictionary {
        self.dict.as_ref()
    }

    /// Add a value without touching its ref count. Returns the index and whether it is new.
    pub(crate) fn add(&mut self, value: &T) -> (Index, bool) {
        let cmp = EnumComparator::with_probe(&self.reader, self.folded, value);
        let store = &mut self.store;
        let result = self.dict.add(&cmp, &mut || store.allocate(EnumEntry::new(value.clone())));
        (result.entry, result.inserted)
    }

    /// Insert outside a batch: creates the value with ref count 1 or bumps it.
    pub fn insert(&mut self, value: &T) -> Index {
        let (idx, _) = self.add(value);
        self.inc_ref_count(idx);
        idx
    }

    pub fn make_batch_updater(&mut self) -> BatchUpdater<'_, T> {
        BatchUpdater::new(self)
    }

    pub fn inc_ref_count(&mut self, idx: Index) {
        let found = self.store.with(idx, |entry| {
            entry.ref_count.fetch_add(1, Ordering::Relaxed);
        });
        assert!(found.is_some(), "inc ref count of missing enum {:?}", idx);
    }

    /// Returns true when the count dropped to zero.
    pub fn dec_ref_count(&mut self, idx: Index) -> bool {
        self.store
            .with(idx, |entry| {
                let previous = entry.ref_count.fetch_sub(1, Ordering::Relaxed);
                assert!(previous > 0, "ref count underflow on enum {:?}", idx);
                previous == 1
            })
            .unwrap_or_else(|| panic!("dec ref count of missing enum {:?}", idx))
    }

    pub(crate) fn set_ref_count(&mut self, idx: Index, count: u32) {
        self.store.with(idx, |entry| entry.ref_count.store(count, Ordering::Relaxed));
    }

    pub fn get_ref_count(&self, idx: Index) -> u32 {
        self.store.with(idx, |entry| entry.ref_count()).unwrap_or(0)
    }

    pub fn get_value(&self, idx: Index) -> T {
        self.store
            .with(idx, |entry| entry.value.clone())
            .unwrap_or_else(|| panic!("enum {:?} does not address a stored value", idx))
    }

    pub fn try_get_value(&self, idx: Index) -> Option<T> {
        self.store.with(idx, |entry| entry.value.clone())
    }

    pub fn find_index(&self, value: &T) -> Option<Index> {
        self.dict.find_index(&self.probe_comparator(value))
    }

    pub fn find_enum(&self, value: &T) -> Option<EnumHandle> {
        self.find_index(value).map(EntryRef::raw)
    }

    /// Every stored value equal to `value` ignoring case.
    pub fn find_folded_enums(&self, value: &T) -> Vec<EnumHandle> {
        self.dict
            .find_matching_enums(&self.probe_comparator(value))
            .into_iter()
            .map(EntryRef::raw)
            .collect()
    }

    pub fn num_uniques(&self) -> usize {
        self.dict.num_uniques()
    }

    fn is_unused(reader: &DataStoreReader<EnumEntry<T>>, idx: Index) -> bool {
        reader.with(idx, |entry| entry.ref_count() == 0).unwrap_or(false)
    }

    /// Sweep the whole dictionary for values nobody references.
    pub fn free_unused_values(&mut self) -> usize {
        let cmp = EnumComparator::new(&self.reader, self.folded);
        let reader = &self.reader;
        let freed = self.dict.free_unused_values(&cmp, &|idx| Self::is_unused(reader, idx));
        for &idx in &freed {
            self.store.hold_entry(idx);
        }
        freed.len()
    }

    /// Sweep only the candidates; they are sorted and de-duplicated first.
    pub fn free_unused_values_in(&mut self, candidates: &mut Vec<Index>) -> usize {
        candidates.sort_unstable();
        candidates.dedup();
        let cmp = EnumComparator::new(&self.reader, self.folded);
        let reader = &self.reader;
        let freed = self
            .dict
            .free_unused_values_in(candidates, &cmp, &|idx| Self::is_unused(reader, idx));
        for &idx in &freed {
            self.store.hold_entry(idx);
        }
        freed.len()
    }

    pub fn freeze_dictionary(&mut self) {
        self.dict.freeze();
    }

    pub fn assign_generation(&mut self, current: Generation) {
        self.store.assign_generation(current);
    }

    pub fn reclaim_memory(&mut self, oldest_used: Generation) {
        self.store.reclaim_memory(oldest_used);
    }

    pub fn reader(&self) -> EnumStoreReader<T> {
        EnumStoreReader::new(self.reader.clone(), self.dict.reader(), self.folded)
    }

    pub fn values_memory_usage(&self) -> MemoryUsage {
        self.store.memory_usage()
    }

    pub fn values_address_space_usage(&self) -> AddressSpace {
        self.store.address_space_usage()
    }

    pub fn dictionary_memory_usage(&self) -> MemoryUsage {
        self.dict.memory_usage()
    }

    pub fn compaction_spec(&self) -> EnumCompactionSpec {
        self.compaction_spec
    }

    /// Refresh memory statistics and decide what the next compaction should target.
    pub fn update_stat(&mut self, strategy: &CompactionStrategy) -> MemoryUsage {
        self.cached_values_memory = self.store.memory_usage();
        self.cached_dictionary_memory = self.dict.memory_usage();
        let values = strategy.should_compact(&self.cached_values_memory, &self.store.address_space_usage());
        let btree_dictionary = self.dict.has_btree() && strategy.should_compact_memory(&self.dict.btree_memory_usage());
        let hash_dictionary = self.dict.has_hash() && strategy.should_compact_memory(&self.dict.hash_memory_usage());
        self.compaction_spec = EnumCompactionSpec {
            values,
            btree_dictionary,
            hash_dictionary,
        };
        let mut total = self.cached_values_memory;
        total += self.cached_dictionary_memory;
        total
    }

    pub fn consider_compact_values(&mut self, strategy: &CompactionStrategy) -> Option<EnumIndexRemapper> {
        if !self.compaction_spec.values.compact() {
            return None;
        }
        let spec = self.compaction_spec.values;
        self.compaction_spec.values = CompactionSpec::default();
        self.compact_worst_values(spec, strategy)
    }

    /// Move every live value out of the worst buffers. The caller remaps its stored
    /// indexes through the returned remapper, then calls `done`.
    pub fn compact_worst_values(
        &mut self,
        spec: CompactionSpec,
        strategy: &CompactionStrategy,
    ) -> Option<EnumIndexRemapper> {
        let buffers = self.store.start_compact_worst_buffers(spec, strategy);
        if buffers.is_empty() {
            return None;
        }
        let filter: RoaringBitmap = DataStore::<EnumEntry<T>>::buffer_filter(&buffers);
        let mut moved: HashMap<Index, Index> = HashMap::new();
        let store = &mut self.store;
        self.dict.move_keys_on_compact(&filter, &mut |old| {
            let new = store.move_entry(old);
            moved.insert(old, new);
            new
        });
        debug!(buffers = ?buffers, moved = moved.len(), "compacted enum store values");
        Some(EnumIndexRemapper::new(moved, filter, buffers))
    }

    pub(crate) fn finish_compact(&mut self, buffers: &[u32]) {
        self.store.finish_compact(buffers);
    }

    pub fn consider_compact_dictionary(&mut self, _strategy: &CompactionStrategy) -> bool {
        let spec = self.compaction_spec;
        if !spec.btree_dictionary && !spec.hash_dictionary {
            return false;
        }
        let cmp = EnumComparator::new(&self.reader, self.folded);
        self.dict.compact_worst(spec.btree_dictionary, spec.hash_dictionary, &cmp);
        self.compaction_spec.btree_dictionary = false;
        self.compaction_spec.hash_dictionary = false;
        debug!(btree = spec.btree_dictionary, hash = spec.hash_dictionary, "compacted enum store dictionary");
        true
    }

    /// 1-based enumeration of the values in dictionary order.
    pub fn make_enumerator(&self) -> Enumerator {
        Enumerator::new(self.dict.as_ref())
    }

    /// Serialize every value once, in dictionary order.
    pub fn write_values(&self, buf: &mut BytesMut) -> usize {
        let mut count = 0;
        self.dict.for_each_entry(&mut |idx, _| {
            self.store.with(idx, |entry| entry.value.serialize(buf));
            count += 1;
        });
        count
    }

    /// Payload slot of the entry owning the posting list for `value`.
    pub fn find_posting_list(&self, value: &T) -> Option<(Index, EntryRef)> {
        self.dict.find_posting_list(&self.probe_comparator(value), false)
    }

    /// Posting list owner of an existing index.
    pub fn posting_owner(&self, idx: Index) -> Option<(Index, EntryRef)> {
        let value = self.try_get_value(idx)?;
        self.find_posting_list(&value)
    }

    pub fn update_posting_list(&mut self, idx: Index, updater: &mut dyn FnMut(EntryRef) -> EntryRef) {
        let cmp = EnumComparator::new(&self.reader, self.folded);
        self.dict.update_posting_list(idx, &cmp, updater);
    }

    pub fn normalize_posting_lists(
        &mut self,
        normalize: &mut dyn FnMut(EntryRef) -> EntryRef,
        filter: &RoaringBitmap,
    ) -> bool {
        self.dict.normalize_posting_lists(normalize, filter)
    }

    pub fn foreach_posting_list(&self, callback: &mut dyn FnMut(EntryRef), filter: &RoaringBitmap) {
        self.dict.foreach_posting_list(callback, filter);
    }

    pub fn clear_all_posting_lists(&mut self, clearer: &mut dyn FnMut(EntryRef)) {
        self.dict.clear_all_posting_lists(clearer);
    }

    pub(crate) fn allocate_unlinked(&mut self, value: T) -> Index {
        self.store.allocate(EnumEntry::new(value))
    }

    pub(crate) fn hold_unlinked(&mut self, idx: Index) {
        self.store.hold_entry(idx);
    }

    pub(crate) fn build_dictionary(&mut self, sorted: &[(Index, EntryRef)]) {
        let cmp = EnumComparator::new(&self.reader, self.folded);
        self.dict.build(sorted, &cmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DictionaryType;
    use crate::core::generation::GenerationHandler;

    fn string_store(kind: DictionaryType, matching: Matching) -> EnumStore<String> {
        EnumStore::new(DictionaryConfig::new(kind, matching), GrowStrategy { initial_entries: 8, grow_factor: 2.0 })
    }

    #[test]
    fn insert_deduplicates_and_counts() {
        for kind in [DictionaryType::Btree, DictionaryType::Hash, DictionaryType::BtreeAndHash] {
            let mut store = string_store(kind, Matching::Cased);
            let a = store.insert(&"a".to_string());
            let b = store.insert(&"b".to_string());
            let a2 = store.insert(&"a".to_string());
            assert_eq!(a, a2);
            assert_ne!(a, b);
            assert_eq!(store.get_ref_count(a), 2);
            assert_eq!(store.num_uniques(), 2);
            assert_eq!(store.get_value(b), "b");
            assert_eq!(store.find_index(&"b".to_string()), Some(b));
            assert_eq!(store.find_enum(&"c".to_string()), None);
        }
    }

    #[test]
    fn unused_values_are_swept_and_reclaimed_after_readers() {
        let mut store = string_store(DictionaryType::Btree, Matching::Cased);
        let handler = GenerationHandler::new();
        let a = store.insert(&"a".to_string());
        store.insert(&"b".to_string());
        store.freeze_dictionary();

        let guard = handler.take_guard();
        assert!(store.dec_ref_count(a));
        assert_eq!(store.free_unused_values(), 1);
        store.freeze_dictionary();
        store.assign_generation(handler.current_generation());
        handler.inc_generation();
        store.reclaim_memory(handler.oldest_used_generation());
        // The guarded reader may still read the freed value.
        assert_eq!(store.try_get_value(a).as_deref(), Some("a"));

        drop(guard);
        handler.update_oldest_used_generation();
        store.reclaim_memory(handler.oldest_used_generation());
        assert_eq!(store.try_get_value(a), None);
        assert_eq!(store.num_uniques(), 1);
    }

    #[test]
    fn folded_lookup_finds_case_variants() {
        let mut store = string_store(DictionaryType::Btree, Matching::Uncased);
        for v in ["Apple", "apple", "APPLE", "pear"] {
            store.insert(&v.to_string());
        }
        assert_eq!(store.find_folded_enums(&"aPpLe".to_string()).len(), 3);
        assert_eq!(store.find_folded_enums(&"pear".to_string()).len(), 1);
        assert!(store.find_index(&"aPpLe".to_string()).is_none());
    }

    #[test]
    fn write_values_follows_dictionary_order() {
        let mut store: EnumStore<i32> = EnumStore::new(DictionaryConfig::default(), GrowStrategy::default());
        for v in [30, 10, 20] {
            store.insert(&v);
        }
        let mut buf = BytesMut::new();
        assert_eq!(store.write_values(&mut buf), 3);
        assert_eq!(&buf[..], &[0, 0, 0, 10, 0, 0, 0, 20, 0, 0, 0, 30]);
    }
}
