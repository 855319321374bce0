use tracing::trace;
use crate::enumstore::enum_store::{EnumStore, Index};
use crate::enumstore::value::EnumValue;

/// Collects ref count changes for one commit and sweeps unused values once at the end.
pub struct BatchUpdater<'a, T: EnumValue> {
    store: &'a mut EnumStore<T>,
    possibly_unused: Vec<Index>,
    default_index: Option<Index>,
}

impl<'a, T: EnumValue> BatchUpdater<'a, T> {
    pub fn new(store: &'a mut EnumStore<T>) -> Self {
        BatchUpdater {
            store,
            possibly_unused: Vec::new(),
            default_index: None,
        }
    }

    pub fn store(&self) -> &EnumStore<T> {
        self.store
    }

    /// Posting list updates go through the store while the batch is open.
    pub(crate) fn store_mut(&mut self) -> &mut EnumStore<T> {
        self.store
    }

    /// Find or add `value`. A fresh value starts unreferenced and is swept at commit
    /// unless its count is raised before then.
    pub fn insert(&mut self, value: &T) -> Index {
        let (idx, inserted) = self.store.add(value);
        if inserted {
            self.possibly_unused.push(idx);
        }
        idx
    }

    /// Index of the default value, looked up at most once per batch.
    pub fn insert_default(&mut self) -> Index {
        if let Some(idx) = self.default_index {
            return idx;
        }
        let idx = self.insert(&T::default_value());
        self.default_index = Some(idx);
        idx
    }

    pub fn inc_ref_count(&mut self, idx: Index) {
        self.store.inc_ref_count(idx);
    }

    pub fn dec_ref_count(&mut self, idx: Index) {
        if self.store.dec_ref_count(idx) {
            self.possibly_unused.push(idx);
        }
    }

    /// Sweep the candidates collected in this batch. Returns how many values were freed.
    pub fn commit(mut self) -> usize {
        self.default_index = None;
        let candidates = self.possibly_unused.len();
        let freed = self.store.free_unused_values_in(&mut self.possibly_unused);
        trace!(candidates, freed, "enum store batch committed");
        freed
    }
}

#[cfg(test)]
mod tests {
    use crate::core::config::{DictionaryConfig, GrowStrategy};
    use crate::enumstore::enum_store::EnumStore;

    #[test]
    fn commit_sweeps_each_candidate_once() {
        let mut store: EnumStore<i64> = EnumStore::new(DictionaryConfig::default(), GrowStrategy::default());
        let mut updater = store.make_batch_updater();
        let a = updater.insert(&1);
        updater.inc_ref_count(a);
        updater.inc_ref_count(a);
        let b = updater.insert(&2);
        // Never referenced, swept.
        updater.insert(&3);
        updater.inc_ref_count(b);
        updater.dec_ref_count(b);
        updater.dec_ref_count(a);
        assert_eq!(updater.commit(), 2);
        assert_eq!(store.num_uniques(), 1);
        assert_eq!(store.get_ref_count(a), 1);
    }

    #[test]
    fn default_value_is_cached_per_batch() {
        let mut store: EnumStore<i32> = EnumStore::new(DictionaryConfig::default(), GrowStrategy::default());
        let mut updater = store.make_batch_updater();
        let d1 = updater.insert_default();
        let d2 = updater.insert_default();
        assert_eq!(d1, d2);
        updater.inc_ref_count(d1);
        updater.commit();
        assert_eq!(store.get_value(d1), i32::MIN);
        assert_eq!(store.num_uniques(), 1);
    }
}
