use std::cmp::Ordering;
use crate::datastore::data_store::DataStoreReader;
use crate::datastore::entry_ref::EntryRef;
use crate::dictionary::comparator::EntryComparator;
use crate::enumstore::enum_store::EnumEntry;
use crate::enumstore::value::EnumValue;

/// Compares enum store refs by value.
///
/// In an uncased dictionary the tree order is folded first and exact second, so case
/// variants sit next to each other with the upper-case forms leading.
pub struct EnumComparator<'a, T: EnumValue> {
    reader: &'a DataStoreReader<EnumEntry<T>>,
    probe: Option<&'a T>,
    folded: bool,
}

impl<'a, T: EnumValue> EnumComparator<'a, T> {
    pub fn new(reader: &'a DataStoreReader<EnumEntry<T>>, folded: bool) -> Self {
        EnumComparator {
            reader,
            probe: None,
            folded,
        }
    }

    pub fn with_probe(reader: &'a DataStoreReader<EnumEntry<T>>, folded: bool, probe: &'a T) -> Self {
        EnumComparator {
            reader,
            probe: Some(probe),
            folded,
        }
    }

    fn with_value<R>(&self, r: EntryRef, f: impl FnOnce(&T) -> R) -> R {
        if !r.valid() {
            return match self.probe {
                Some(probe) => f(probe),
                None => panic!("comparator without probe asked for the invalid ref"),
            };
        }
        self.reader
            .with(r, |entry| f(&entry.value))
            .unwrap_or_else(|| panic!("enum ref {:?} does not address a stored value", r))
    }

    fn with_pair<R>(&self, lhs: EntryRef, rhs: EntryRef, f: impl FnOnce(&T, &T) -> R) -> R {
        self.with_value(lhs, |l| self.with_value(rhs, |r| f(l, r)))
    }
}

impl<T: EnumValue> EntryComparator for EnumComparator<'_, T> {
    fn compare(&self, lhs: EntryRef, rhs: EntryRef) -> Ordering {
        if lhs == rhs && lhs.valid() {
            return Ordering::Equal;
        }
        let folded = self.folded;
        self.with_pair(lhs, rhs, |l, r| {
            if folded {
                l.compare_folded(r).then_with(|| l.compare(r))
            } else {
                l.compare(r)
            }
        })
    }

    fn compare_folded(&self, lhs: EntryRef, rhs: EntryRef) -> Ordering {
        if !self.folded {
            return self.compare(lhs, rhs);
        }
        self.with_pair(lhs, rhs, |l, r| l.compare_folded(r))
    }

    fn hash(&self, r: EntryRef) -> u64 {
        self.with_value(r, |v| v.hash_folded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GrowStrategy;
    use crate::datastore::data_store::DataStore;

    #[test]
    fn probe_stands_in_for_invalid_ref() {
        let mut store: DataStore<EnumEntry<String>> = DataStore::new(GrowStrategy::default());
        let apple = store.allocate(EnumEntry::new("Apple".to_string()));
        let reader = store.reader();
        let probe = "apple".to_string();
        let folded = EnumComparator::with_probe(&reader, true, &probe);
        assert_eq!(folded.compare_folded(apple, EntryRef::invalid()), Ordering::Equal);
        assert_eq!(folded.compare(apple, EntryRef::invalid()), Ordering::Less);
        assert_eq!(folded.hash(apple), folded.hash(EntryRef::invalid()));

        let cased = EnumComparator::with_probe(&reader, false, &probe);
        assert_eq!(cased.compare_folded(apple, EntryRef::invalid()), Ordering::Less);
    }
}
