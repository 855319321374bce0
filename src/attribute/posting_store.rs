use roaring::RoaringBitmap;
use tracing::debug;
use crate::core::config::GrowStrategy;
use crate::core::generation::Generation;
use crate::core::stats::MemoryUsage;
use crate::datastore::compaction::{CompactionSpec, CompactionStrategy};
use crate::datastore::data_store::{DataStore, DataStoreReader};
use crate::datastore::entry_ref::EntryRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: u32,
    pub weight: i32,
}

/// Documents holding one value (or one folded group of values).
///
/// Plain lists are bitmaps. Weighted-set lists keep a weight per document, sorted by
/// doc id.
#[derive(Debug, Clone, PartialEq)]
pub enum PostingList {
    Bitmap(RoaringBitmap),
    Weighted(Vec<Posting>),
}

impl PostingList {
    pub fn len(&self) -> usize {
        match self {
            PostingList::Bitmap(bitmap) => bitmap.len() as usize,
            PostingList::Weighted(postings) => postings.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, doc_id: u32) -> bool {
        match self {
            PostingList::Bitmap(bitmap) => bitmap.contains(doc_id),
            PostingList::Weighted(postings) => postings.binary_search_by_key(&doc_id, |p| p.doc_id).is_ok(),
        }
    }

    pub fn postings(&self) -> Vec<Posting> {
        match self {
            PostingList::Bitmap(bitmap) => bitmap.iter().map(|doc_id| Posting { doc_id, weight: 1 }).collect(),
            PostingList::Weighted(postings) => postings.clone(),
        }
    }

    pub fn doc_ids(&self) -> RoaringBitmap {
        match self {
            PostingList::Bitmap(bitmap) => bitmap.clone(),
            PostingList::Weighted(postings) => postings.iter().map(|p| p.doc_id).collect(),
        }
    }

    fn add_posting(&mut self, posting: Posting) {
        match self {
            PostingList::Bitmap(bitmap) => {
                bitmap.insert(posting.doc_id);
            }
            PostingList::Weighted(postings) => match postings.binary_search_by_key(&posting.doc_id, |p| p.doc_id) {
                Ok(pos) => postings[pos] = posting,
                Err(pos) => postings.insert(pos, posting),
            },
        }
    }

    fn remove_doc(&mut self, doc_id: u32) {
        match self {
            PostingList::Bitmap(bitmap) => {
                bitmap.remove(doc_id);
            }
            PostingList::Weighted(postings) => {
                if let Ok(pos) = postings.binary_search_by_key(&doc_id, |p| p.doc_id) {
                    postings.remove(pos);
                }
            }
        }
    }
}

/// Copy-on-write store of posting lists. A list ref goes into the payload slot of its
/// dictionary entry; every change allocates a new list and holds the old one.
pub struct PostingStore {
    store: DataStore<PostingList>,
    weighted: bool,
    list_bytes: usize,
}

impl PostingStore {
    pub fn new(weighted: bool, grow: GrowStrategy) -> Self {
        PostingStore {
            store: DataStore::new(grow),
            weighted,
            list_bytes: 0,
        }
    }

    fn empty_list(&self) -> PostingList {
        if self.weighted {
            PostingList::Weighted(Vec::new())
        } else {
            PostingList::Bitmap(RoaringBitmap::new())
        }
    }

    fn list_size(list: &PostingList) -> usize {
        match list {
            PostingList::Bitmap(bitmap) => bitmap.serialized_size(),
            PostingList::Weighted(postings) => postings.len() * std::mem::size_of::<Posting>(),
        }
    }

    fn publish(&mut self, list: PostingList) -> EntryRef {
        if list.is_empty() {
            return EntryRef::invalid();
        }
        self.list_bytes += Self::list_size(&list);
        self.store.allocate(list)
    }

    /// Build a list from postings sorted by doc id.
    pub fn make_list(&mut self, postings: &[(u32, i32)]) -> EntryRef {
        let mut list = self.empty_list();
        for &(doc_id, weight) in postings {
            list.add_posting(Posting { doc_id, weight });
        }
        self.publish(list)
    }

    /// Apply removals, then additions, to a copy of `old`. Returns the replacement ref,
    /// invalid when the list became empty.
    pub fn apply(&mut self, old: EntryRef, adds: &[(u32, i32)], removes: &[u32]) -> EntryRef {
        let mut list = self.store.get(old).unwrap_or_else(|| self.empty_list());
        for &doc_id in removes {
            list.remove_doc(doc_id);
        }
        for &(doc_id, weight) in adds {
            list.add_posting(Posting { doc_id, weight });
        }
        self.clear(old);
        self.publish(list)
    }

    pub fn clear(&mut self, r: EntryRef) {
        if r.valid() {
            let size = self.store.with(r, Self::list_size).unwrap_or(0);
            self.list_bytes = self.list_bytes.saturating_sub(size);
            self.store.hold_entry(r);
        }
    }

    pub fn get(&self, r: EntryRef) -> Option<PostingList> {
        self.store.get(r)
    }

    pub fn reader(&self) -> PostingStoreReader {
        PostingStoreReader {
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
        usage.allocated_bytes += self.list_bytes;
        usage.used_bytes += self.list_bytes;
        usage
    }

    pub fn should_compact(&self, strategy: &CompactionStrategy) -> CompactionSpec {
        strategy.should_compact(&self.store.memory_usage(), &self.store.address_space_usage())
    }

    /// Select buffers to empty. The caller moves every list in the returned filter with
    /// `move_list`, then calls `finish_compact`.
    pub fn start_compact(&mut self, spec: CompactionSpec, strategy: &CompactionStrategy) -> Vec<u32> {
        self.store.start_compact_worst_buffers(spec, strategy)
    }

    pub fn move_list(&mut self, r: EntryRef) -> EntryRef {
        self.store.move_entry(r)
    }

    pub fn finish_compact(&mut self, buffer_ids: &[u32]) {
        debug!(buffers = ?buffer_ids, "compacted posting store");
        self.store.finish_compact(buffer_ids);
    }
}

#[derive(Clone)]
pub struct PostingStoreReader {
    store: DataStoreReader<PostingList>,
}

impl PostingStoreReader {
    pub fn with<R>(&self, r: EntryRef, f: impl FnOnce(&PostingList) -> R) -> Option<R> {
        self.store.with(r, f)
    }

    pub fn postings(&self, r: EntryRef) -> Vec<Posting> {
        self.with(r, PostingList::postings).unwrap_or_default()
    }

    pub fn doc_ids(&self, r: EntryRef) -> RoaringBitmap {
        self.with(r, PostingList::doc_ids).unwrap_or_default()
    }
}
