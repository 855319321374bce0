use crate::core::config::GrowStrategy;
use crate::core::generation::Generation;
use crate::core::stats::MemoryUsage;
use crate::datastore::compaction::{CompactionSpec, CompactionStrategy};
use crate::datastore::data_store::{DataStore, DataStoreReader};
use crate::datastore::entry_ref::EntryRef;

/// Stores small immutable arrays, one per entry ref. The empty array is the null ref.
pub struct ArrayStore<T> {
    store: DataStore<Box<[T]>>,
    dynamic_bytes: usize,
}

impl<T: Clone + Send + Sync + 'static> ArrayStore<T> {
    pub fn new(grow: GrowStrategy) -> Self {
        ArrayStore {
            store: DataStore::new(grow),
            dynamic_bytes: 0,
        }
    }

    pub fn add(&mut self, values: &[T]) -> EntryRef {
        if values.is_empty() {
            return EntryRef::invalid();
        }
        self.dynamic_bytes += values.len() * std::mem::size_of::<T>();
        self.store.allocate(values.to_vec().into_boxed_slice())
    }

    pub fn get(&self, r: EntryRef) -> Vec<T> {
        self.store.with(r, |values| values.to_vec()).unwrap_or_default()
    }

    pub fn len_of(&self, r: EntryRef) -> usize {
        self.store.with(r, |values| values.len()).unwrap_or(0)
    }

    pub fn remove(&mut self, r: EntryRef) {
        if r.valid() {
            let len = self.len_of(r);
            self.dynamic_bytes = self.dynamic_bytes.saturating_sub(len * std::mem::size_of::<T>());
            self.store.hold_entry(r);
        }
    }

    pub fn reader(&self) -> ArrayStoreReader<T> {
        ArrayStoreReader {
            store: self.store.reader(),
        }
    }

    pub fn assign_generation(&mut self, current: Generation) {
        self.store.assign_generation(current);
    }

    pub fn reclaim_memory(&mut self, oldest_used: Generation) {
        self.store.reclaim_memory(oldest_used);
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.store.memory_usage();
        usage.allocated_bytes += self.dynamic_bytes;
        usage.used_bytes += self.dynamic_bytes;
        usage
    }

    pub fn start_compact(&mut self, spec: CompactionSpec, strategy: &CompactionStrategy) -> Vec<u32> {
        self.store.start_compact_worst_buffers(spec, strategy)
    }

    pub fn move_entry(&mut self, r: EntryRef) -> EntryRef {
        self.store.move_entry(r)
    }

    pub fn finish_compact(&mut self, buffer_ids: &[u32]) {
        self.store.finish_compact(buffer_ids);
    }

    pub fn should_compact(&self, strategy: &CompactionStrategy) -> CompactionSpec {
        strategy.should_compact(&self.store.memory_usage(), &self.store.address_space_usage())
    }
}

pub struct ArrayStoreReader<T> {
    store: DataStoreReader<Box<[T]>>,
}

impl<T> Clone for ArrayStoreReader<T> {
    fn clone(&self) -> Self {
        ArrayStoreReader {
            store: self.store.clone(),
        }
    }
}

impl<T: Clone> ArrayStoreReader<T> {
    pub fn get(&self, r: EntryRef) -> Vec<T> {
        self.store.with(r, |values| values.to_vec()).unwrap_or_default()
    }

    pub fn with<R>(&self, r: EntryRef, f: impl FnOnce(&[T]) -> R) -> R {
        let mut f = Some(f);
        if let Some(Some(result)) = self.store.with(r, |values| f.take().map(|f| f(values))) {
            return result;
        }
        match f.take() {
            Some(f) => f(&[]),
            None => unreachable!("array callback consumed without a result"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_array_maps_to_null_ref() {
        let mut store: ArrayStore<u32> = ArrayStore::new(GrowStrategy::default());
        assert!(!store.add(&[]).valid());
        let r = store.add(&[1, 2, 3]);
        assert_eq!(store.get(r), vec![1, 2, 3]);
        assert_eq!(store.reader().get(EntryRef::invalid()), Vec::<u32>::new());
        assert_eq!(store.reader().with(r, |values| values.len()), 3);
    }
}
