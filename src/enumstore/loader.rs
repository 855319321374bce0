use rayon::slice::ParallelSliceMut;
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::datastore::entry_ref::EntryRef;
use crate::dictionary::comparator::EntryComparator;
use crate::enumstore::enum_store::{EnumStore, Index};
use crate::enumstore::value::EnumValue;

/// Rebuilds an enum store from a unique-values blob and per-document saved enums.
///
/// Saved enums are 0-based positions in the blob. When the blob is not in this store's
/// dictionary order the values are re-sorted and `enum_value_remapping` translates
/// saved positions into the sorted ones.
pub struct EnumeratedLoader<'a, T: EnumValue> {
    store: &'a mut EnumStore<T>,
    indexes: Vec<Index>,
    enum_value_remapping: Vec<u32>,
    ref_counts: Vec<u32>,
}

impl<'a, T: EnumValue> EnumeratedLoader<'a, T> {
    pub fn new(store: &'a mut EnumStore<T>) -> Self {
        EnumeratedLoader {
            store,
            indexes: Vec::new(),
            enum_value_remapping: Vec::new(),
            ref_counts: Vec::new(),
        }
    }

    pub fn store(&self) -> &EnumStore<T> {
        self.store
    }

    /// Read every value in the blob. Returns the number of distinct values kept.
    pub fn load_unique_values(&mut self, mut data: &[u8]) -> Result<usize> {
        let mut saved = Vec::new();
        while !data.is_empty() {
            match T::deserialize(&mut data) {
                Ok(value) => saved.push(self.store.allocate_unlinked(value)),
                Err(err) => {
                    for &idx in &saved {
                        self.store.hold_unlinked(idx);
                    }
                    return Err(err);
                }
            }
        }
        let (indexes, remapping, duplicates) = {
            let cmp = self.store.comparator();
            if saved.windows(2).all(|w| cmp.less(w[0], w[1])) {
                (saved, Vec::new(), Vec::new())
            } else {
                sort_unique(&saved, &cmp)
            }
        };
        for &dup in &duplicates {
            self.store.hold_unlinked(dup);
        }
        if !remapping.is_empty() {
            debug!(
                values = remapping.len(),
                unique = indexes.len(),
                duplicates = duplicates.len(),
                "unique values were saved out of order, remapping enums"
            );
        }
        self.ref_counts = vec![0; indexes.len()];
        self.indexes = indexes;
        self.enum_value_remapping = remapping;
        Ok(self.indexes.len())
    }

    pub fn enum_indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn enum_value_remapping(&self) -> &[u32] {
        &self.enum_value_remapping
    }

    pub fn release_enum_value_remapping(&mut self) {
        self.enum_value_remapping = Vec::new();
    }

    /// Give back every value read so far, leaving the store as it was before loading.
    pub fn abort(mut self) {
        for &idx in &self.indexes {
            self.store.hold_unlinked(idx);
        }
    }

    /// Position in sorted order of a saved enum.
    ///
    /// A saved enum outside the blob is reported as corrupt data rather than asserted:
    /// it comes from a file, and the caller can still load a good copy.
    pub fn map_saved_enum(&self, saved: u32) -> Result<u32> {
        let position = if self.enum_value_remapping.is_empty() {
            saved
        } else {
            *self
                .enum_value_remapping
                .get(saved as usize)
                .ok_or_else(|| Error::corrupt(format!("saved enum {} out of range", saved)))?
        };
        if position as usize >= self.indexes.len() {
            return Err(Error::corrupt(format!(
                "saved enum {} out of range ({} unique values)",
                saved,
                self.indexes.len()
            )));
        }
        Ok(position)
    }

    /// Resolve a saved enum to its index and count the reference.
    pub fn resolve(&mut self, saved: u32) -> Result<Index> {
        let position = self.map_saved_enum(saved)?;
        self.ref_counts[position as usize] += 1;
        Ok(self.indexes[position as usize])
    }

    /// Install ref counts and build the dictionary from the sorted indexes.
    pub fn build_dictionary(&mut self) {
        for (&idx, &count) in self.indexes.iter().zip(self.ref_counts.iter()) {
            self.store.set_ref_count(idx, count);
        }
        let entries: Vec<(Index, EntryRef)> = self.indexes.iter().map(|&idx| (idx, EntryRef::invalid())).collect();
        self.store.build_dictionary(&entries);
    }

    pub fn free_unused_values(&mut self) -> usize {
        self.store.free_unused_values()
    }
}

/// Sort refs by value and drop duplicates. Returns the unique refs, the saved position
/// to sorted position mapping and the dropped duplicates.
fn sort_unique(saved: &[Index], cmp: &dyn EntryComparator) -> (Vec<Index>, Vec<u32>, Vec<Index>) {
    let mut order: Vec<usize> = (0..saved.len()).collect();
    order.sort_by(|&a, &b| cmp.compare(saved[a], saved[b]));
    let mut indexes: Vec<Index> = Vec::with_capacity(saved.len());
    let mut remapping = vec![0u32; saved.len()];
    let mut duplicates = Vec::new();
    for pos in order {
        let idx = saved[pos];
        match indexes.last() {
            Some(&last) if cmp.equal(last, idx) => duplicates.push(idx),
            _ => indexes.push(idx),
        }
        remapping[pos] = (indexes.len() - 1) as u32;
    }
    (indexes, remapping, duplicates)
}

/// Loader that also rebuilds posting lists from `(enum, docid, weight)` triples.
pub struct EnumeratedPostingsLoader<'a, T: EnumValue> {
    loader: EnumeratedLoader<'a, T>,
    loaded: Vec<(u32, u32, i32)>,
}

impl<'a, T: EnumValue> EnumeratedPostingsLoader<'a, T> {
    pub fn new(store: &'a mut EnumStore<T>) -> Self {
        EnumeratedPostingsLoader {
            loader: EnumeratedLoader::new(store),
            loaded: Vec::new(),
        }
    }

    pub fn loader(&mut self) -> &mut EnumeratedLoader<'a, T> {
        &mut self.loader
    }

    pub fn load_unique_values(&mut self, data: &[u8]) -> Result<usize> {
        self.loader.load_unique_values(data)
    }

    pub fn abort(self) {
        self.loader.abort();
    }

    /// Resolve a saved enum for `docid` and remember the posting.
    pub fn resolve(&mut self, saved: u32, docid: u32, weight: i32) -> Result<Index> {
        let position = self.loader.map_saved_enum(saved)?;
        let idx = self.loader.resolve(saved)?;
        self.loaded.push((position, docid, weight));
        Ok(idx)
    }

    /// Finish loading. `make_list` turns the docid-sorted postings of one value group
    /// into a posting list ref stored as the group owner's payload.
    pub fn finish(mut self, make_list: &mut dyn FnMut(&[(u32, i32)]) -> EntryRef) -> usize {
        self.loader.build_dictionary();
        let freed = self.loader.free_unused_values();
        self.loaded.par_sort_unstable();

        // Only a tree shares one list across a folded group.
        let folded = self.loader.store.is_folded() && self.loader.store.dictionary().has_btree();
        let indexes = std::mem::take(&mut self.loader.indexes);
        let mut groups: Vec<(Index, Vec<(u32, i32)>)> = Vec::new();
        {
            let cmp = self.loader.store.comparator();
            let mut current: Option<(u32, Index, Vec<(u32, i32)>)> = None;
            for &(position, docid, weight) in &self.loaded {
                let idx = indexes[position as usize];
                let same_group = match &current {
                    Some((last, owner, _)) => {
                        *last == position || (folded && cmp.folded_equal(*owner, idx))
                    }
                    None => false,
                };
                if !same_group {
                    if let Some((_, owner, postings)) = current.take() {
                        groups.push((owner, postings));
                    }
                    current = Some((position, idx, Vec::new()));
                }
                if let Some((last, _, postings)) = current.as_mut() {
                    *last = position;
                    postings.push((docid, weight));
                }
            }
            if let Some((_, owner, postings)) = current.take() {
                groups.push((owner, postings));
            }
        }
        let num_lists = groups.len();
        for (owner, mut postings) in groups {
            if folded {
                postings.sort_by_key(|&(docid, _)| docid);
                postings.dedup_by_key(|&mut (docid, _)| docid);
            }
            let list = make_list(&postings);
            self.loader.store.update_posting_list(owner, &mut |_| list);
        }
        debug!(lists = num_lists, postings = self.loaded.len(), freed, "rebuilt posting lists from saved enums");
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use crate::core::config::{DictionaryConfig, DictionaryType, GrowStrategy, Matching};

    fn blob<T: EnumValue>(values: &[T]) -> BytesMut {
        let mut buf = BytesMut::new();
        for v in values {
            v.serialize(&mut buf);
        }
        buf
    }

    #[test]
    fn sorted_blob_needs_no_remapping() {
        let mut store: EnumStore<i32> = EnumStore::new(DictionaryConfig::default(), GrowStrategy::default());
        let mut loader = EnumeratedLoader::new(&mut store);
        assert_eq!(loader.load_unique_values(&blob(&[1, 5, 9])).unwrap(), 3);
        assert!(loader.enum_value_remapping().is_empty());
        let idx = loader.resolve(1).unwrap();
        loader.resolve(1).unwrap();
        loader.build_dictionary();
        assert_eq!(loader.free_unused_values(), 2);
        assert_eq!(store.get_value(idx), 5);
        assert_eq!(store.get_ref_count(idx), 2);
        assert_eq!(store.num_uniques(), 1);
    }

    #[test]
    fn unsorted_blob_is_remapped_and_deduplicated() {
        let mut store: EnumStore<String> = EnumStore::new(
            DictionaryConfig::new(DictionaryType::Btree, Matching::Cased),
            GrowStrategy::default(),
        );
        let mut loader = EnumeratedLoader::new(&mut store);
        let values: Vec<String> = ["pear", "apple", "fig", "apple"].iter().map(|s| s.to_string()).collect();
        assert_eq!(loader.load_unique_values(&blob(&values)).unwrap(), 3);
        assert_eq!(loader.enum_value_remapping(), &[2, 0, 1, 0]);
        let pear = loader.resolve(0).unwrap();
        let apple = loader.resolve(3).unwrap();
        assert_eq!(loader.resolve(1).unwrap(), apple);
        assert!(loader.resolve(4).is_err());
        loader.build_dictionary();
        loader.free_unused_values();
        assert_eq!(store.get_value(pear), "pear");
        assert_eq!(store.get_ref_count(apple), 2);
        assert_eq!(store.num_uniques(), 2);
    }

    #[test]
    fn postings_are_grouped_by_folded_value() {
        let mut store: EnumStore<String> = EnumStore::new(
            DictionaryConfig::new(DictionaryType::Btree, Matching::Uncased),
            GrowStrategy::default(),
        );
        let mut loader = EnumeratedPostingsLoader::new(&mut store);
        let values: Vec<String> = ["Apple", "apple", "kiwi"].iter().map(|s| s.to_string()).collect();
        loader.load_unique_values(&blob(&values)).unwrap();
        loader.resolve(1, 4, 1).unwrap();
        loader.resolve(0, 2, 1).unwrap();
        loader.resolve(1, 2, 1).unwrap();
        loader.resolve(2, 3, 1).unwrap();

        let mut lists: Vec<Vec<u32>> = Vec::new();
        loader.finish(&mut |postings| {
            lists.push(postings.iter().map(|&(docid, _)| docid).collect());
            EntryRef::new(100, lists.len() as u32)
        });
        assert_eq!(lists, vec![vec![2, 4], vec![3]]);
        let (owner, list) = store.find_posting_list(&"APPLE".to_string()).unwrap();
        assert_eq!(store.get_value(owner), "Apple");
        assert_eq!(list, EntryRef::new(100, 1));
    }
}
