use std::sync::Arc;
use crate::core::generation::{GenerationGuard, GenerationHandler};
use crate::datastore::data_store::DataStoreReader;
use crate::datastore::entry_ref::EntryRef;
use crate::dictionary::comparator::EntryComparator;
use crate::dictionary::read_snapshot::{DictionaryReader, DictionarySnapshot};
use crate::enumstore::comparator::EnumComparator;
use crate::enumstore::enum_store::{EnumEntry, EnumHandle, Index};
use crate::enumstore::value::EnumValue;

/// Cloneable read side of an enum store, safe to send to query threads.
pub struct EnumStoreReader<T> {
    values: DataStoreReader<EnumEntry<T>>,
    dictionary: DictionaryReader,
    folded: bool,
}

impl<T> Clone for EnumStoreReader<T> {
    fn clone(&self) -> Self {
        EnumStoreReader {
            values: self.values.clone(),
            dictionary: self.dictionary.clone(),
            folded: self.folded,
        }
    }
}

impl<T: EnumValue> EnumStoreReader<T> {
    pub(crate) fn new(values: DataStoreReader<EnumEntry<T>>, dictionary: DictionaryReader, folded: bool) -> Self {
        EnumStoreReader {
            values,
            dictionary,
            folded,
        }
    }

    /// Take a generation guard, then snapshot the dictionary under it.
    pub fn read_guard(&self, generations: &Arc<GenerationHandler>) -> EnumStoreReadGuard<T> {
        let guard = generations.take_guard();
        EnumStoreReadGuard {
            snapshot: self.dictionary.snapshot(),
            values: self.values.clone(),
            folded: self.folded,
            _guard: guard,
        }
    }

    /// Value lookup without a guard, for callers already holding one.
    pub fn get_value(&self, idx: Index) -> Option<T> {
        self.values.with(idx, |entry| entry.value.clone())
    }
}

/// Everything a query needs to read enum values consistently.
pub struct EnumStoreReadGuard<T> {
    snapshot: DictionarySnapshot,
    values: DataStoreReader<EnumEntry<T>>,
    folded: bool,
    _guard: GenerationGuard,
}

impl<T: EnumValue> EnumStoreReadGuard<T> {
    fn probe<'a>(&'a self, value: &'a T) -> EnumComparator<'a, T> {
        EnumComparator::with_probe(&self.values, self.folded, value)
    }

    pub fn comparator(&self) -> EnumComparator<'_, T> {
        EnumComparator::new(&self.values, self.folded)
    }

    pub fn get_value(&self, idx: Index) -> Option<T> {
        self.values.with(idx, |entry| entry.value.clone())
    }

    pub fn get_ref_count(&self, idx: Index) -> u32 {
        self.values.with(idx, |entry| entry.ref_count()).unwrap_or(0)
    }

    pub fn find_enum(&self, value: &T) -> Option<EnumHandle> {
        self.snapshot.find_frozen_index(&self.probe(value)).map(EntryRef::raw)
    }

    pub fn find_index(&self, value: &T) -> Option<Index> {
        self.snapshot.find_frozen_index(&self.probe(value))
    }

    pub fn find_folded_enums(&self, value: &T) -> Vec<EnumHandle> {
        self.snapshot
            .find_matching_enums(&self.probe(value))
            .into_iter()
            .map(EntryRef::raw)
            .collect()
    }

    pub fn find_posting_list(&self, value: &T) -> Option<(Index, EntryRef)> {
        self.snapshot.find_posting_list(&self.probe(value))
    }

    pub fn matching_posting_lists(&self, value: &T) -> Vec<EntryRef> {
        self.snapshot.matching_posting_lists(&self.probe(value))
    }

    /// Indexes a term query for `value` matches: every case variant when folded.
    pub fn matching_enums(&self, value: &T) -> Vec<Index> {
        if self.folded {
            self.snapshot.find_matching_enums(&self.probe(value))
        } else {
            self.find_index(value).into_iter().collect()
        }
    }

    pub fn is_folded(&self) -> bool {
        self.folded
    }

    /// Values in `[low, high)` in order.
    pub fn range(&self, low: &T, high: &T) -> Vec<(Index, EntryRef)> {
        let high_cmp = self.probe(high);
        let mut found = Vec::new();
        self.snapshot.for_each_from(&self.probe(low), &mut |k, d| {
            if high_cmp.less(k, EntryRef::invalid()) {
                found.push((k, d));
                true
            } else {
                false
            }
        });
        found
    }

    pub fn count(&self, low: &T, high: &T) -> usize {
        self.snapshot.count(&self.probe(low), &self.probe(high))
    }

    pub fn num_uniques(&self) -> usize {
        self.snapshot.len()
    }

    pub fn snapshot(&self) -> &DictionarySnapshot {
        &self.snapshot
    }
}
