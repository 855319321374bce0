use std::collections::BTreeMap;
use std::sync::Arc;
use roaring::RoaringBitmap;
use tracing::debug;
use crate::attribute::multi_value::{MultiValueMapping, WeightedIndex};
use crate::attribute::posting_store::PostingStore;
use crate::attribute::read_guard::{EnumAttributeReader, ValuesReader};
use crate::attribute::single_value::SingleValueMapping;
use crate::core::config::{AttributeConfig, CollectionType};
use crate::core::error::{Error, Result};
use crate::core::generation::GenerationHandler;
use crate::core::stats::{AttributeStats, MemoryUsage};
use crate::dictionary::comparator::EntryComparator;
use crate::enumstore::enum_store::{EnumStore, Index};
use crate::enumstore::value::EnumValue;

pub(crate) enum DocValues {
    Single(SingleValueMapping),
    Multi(MultiValueMapping),
}

/// Values of one document before and after a commit.
struct DocChange {
    doc_id: u32,
    old: Vec<WeightedIndex>,
    new: Vec<WeightedIndex>,
}

/// Enum-backed attribute column: every document refers to deduplicated values in an
/// [`EnumStore`].
///
/// Updates are queued and applied by [`commit`](Self::commit), which also publishes
/// a new generation, reclaims memory no reader can see and compacts when the
/// configured [`CompactionStrategy`](crate::datastore::compaction::CompactionStrategy)
/// says so. With `fast_search` each value (or folded group of values) carries a
/// posting list in its dictionary payload.
pub struct EnumAttribute<T: EnumValue> {
    pub(crate) name: String,
    pub(crate) config: AttributeConfig,
    pub(crate) enum_store: EnumStore<T>,
    pub(crate) values: DocValues,
    pub(crate) postings: Option<PostingStore>,
    pub(crate) generations: Arc<GenerationHandler>,
    pending: BTreeMap<u32, Vec<(T, i32)>>,
    stats: AttributeStats,
}

impl<T: EnumValue> EnumAttribute<T> {
    pub fn new(name: &str, config: AttributeConfig) -> Self {
        Self::with_generations(name, config, Arc::new(GenerationHandler::new()))
    }

    pub fn with_generations(name: &str, config: AttributeConfig, generations: Arc<GenerationHandler>) -> Self {
        assert_eq!(
            config.basic_type,
            T::BASIC_TYPE,
            "attribute '{}' configured as {:?}",
            name,
            config.basic_type
        );
        let values = match config.collection {
            CollectionType::Single => DocValues::Single(SingleValueMapping::new()),
            CollectionType::Array | CollectionType::WeightedSet => {
                DocValues::Multi(MultiValueMapping::new(config.grow))
            }
        };
        let postings = config
            .fast_search
            .then(|| PostingStore::new(config.is_weighted_set(), config.grow));
        EnumAttribute {
            name: name.to_string(),
            enum_store: EnumStore::from_config(&config),
            config,
            values,
            postings,
            generations,
            pending: BTreeMap::new(),
            stats: AttributeStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AttributeConfig {
        &self.config
    }

    pub fn generations(&self) -> &Arc<GenerationHandler> {
        &self.generations
    }

    pub fn enum_store(&self) -> &EnumStore<T> {
        &self.enum_store
    }

    pub fn num_docs(&self) -> u32 {
        match &self.values {
            DocValues::Single(mapping) => mapping.num_docs(),
            DocValues::Multi(mapping) => mapping.num_docs(),
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Add a document. Single-value documents start out holding the default value.
    pub fn add_doc(&mut self) -> u32 {
        match &mut self.values {
            DocValues::Single(mapping) => {
                let idx = self.enum_store.insert(&T::default_value());
                let doc_id = mapping.add_doc(idx);
                if let Some(postings) = self.postings.as_mut() {
                    let change = DocChange {
                        doc_id,
                        old: Vec::new(),
                        new: vec![WeightedIndex::new(idx, 1)],
                    };
                    update_postings(&mut self.enum_store, postings, &[change]);
                }
                doc_id
            }
            DocValues::Multi(mapping) => mapping.add_doc(),
        }
    }

    fn check_doc(&self, doc_id: u32) -> Result<()> {
        if doc_id >= self.num_docs() {
            return Err(Error::invalid_argument(format!(
                "doc {} out of range for attribute '{}' ({} docs)",
                doc_id,
                self.name,
                self.num_docs()
            )));
        }
        Ok(())
    }

    fn normalize(&self, values: Vec<(T, i32)>) -> Vec<(T, i32)> {
        match self.config.collection {
            CollectionType::Single => values,
            CollectionType::Array => values.into_iter().map(|(v, _)| (v, 1)).collect(),
            CollectionType::WeightedSet => {
                let mut set: Vec<(T, i32)> = Vec::with_capacity(values.len());
                for (value, weight) in values {
                    match set.iter_mut().find(|(v, _)| v.compare(&value).is_eq()) {
                        Some(existing) => existing.1 = weight,
                        None => set.push((value, weight)),
                    }
                }
                set
            }
        }
    }

    /// Queue a full replacement of a document's values.
    pub fn set_values(&mut self, doc_id: u32, values: Vec<(T, i32)>) -> Result<()> {
        self.check_doc(doc_id)?;
        if self.config.collection == CollectionType::Single && values.len() > 1 {
            return Err(Error::invalid_input(format!(
                "{} values for single-value attribute '{}'",
                values.len(),
                self.name
            )));
        }
        let values = self.normalize(values);
        self.pending.insert(doc_id, values);
        Ok(())
    }

    pub fn update(&mut self, doc_id: u32, value: T) -> Result<()> {
        self.set_values(doc_id, vec![(value, 1)])
    }

    pub fn clear_doc(&mut self, doc_id: u32) -> Result<()> {
        self.set_values(doc_id, Vec::new())
    }

    /// Add one value to a multi-value document. A weighted set replaces the weight of
    /// an existing value.
    pub fn append(&mut self, doc_id: u32, value: T, weight: i32) -> Result<()> {
        self.check_doc(doc_id)?;
        if self.config.collection == CollectionType::Single {
            return Err(Error::invalid_input(format!("append to single-value attribute '{}'", self.name)));
        }
        let mut values = self.current_values(doc_id);
        values.push((value, weight));
        self.set_values(doc_id, values)
    }

    /// Remove every occurrence of `value` from a multi-value document.
    pub fn remove(&mut self, doc_id: u32, value: &T) -> Result<()> {
        self.check_doc(doc_id)?;
        let mut values = self.current_values(doc_id);
        values.retain(|(v, _)| !v.compare(value).is_eq());
        self.set_values(doc_id, values)
    }

    /// Queued values if the document has uncommitted changes, else committed values.
    fn current_values(&self, doc_id: u32) -> Vec<(T, i32)> {
        match self.pending.get(&doc_id) {
            Some(values) => values.clone(),
            None => self.get_values(doc_id),
        }
    }

    /// Committed values of a document.
    pub fn get_values(&self, doc_id: u32) -> Vec<(T, i32)> {
        if doc_id >= self.num_docs() {
            return Vec::new();
        }
        match &self.values {
            DocValues::Single(mapping) => vec![(self.enum_store.get_value(mapping.get(doc_id)), 1)],
            DocValues::Multi(mapping) => mapping
                .get(doc_id)
                .into_iter()
                .map(|v| (self.enum_store.get_value(v.index), v.weight))
                .collect(),
        }
    }

    pub fn get_indexes(&self, doc_id: u32) -> Vec<WeightedIndex> {
        match &self.values {
            DocValues::Single(mapping) => vec![WeightedIndex::new(mapping.get(doc_id), 1)],
            DocValues::Multi(mapping) => mapping.get(doc_id),
        }
    }

    /// Apply queued updates and make them visible to new read guards.
    pub fn commit(&mut self) {
        let changed = self.pending.len();
        let freed = self.apply_pending();
        self.finish_generation();
        let compacted = self.compact();
        if compacted {
            self.finish_generation();
        }
        self.update_stats();
        debug!(
            attribute = %self.name,
            changed,
            freed,
            compacted,
            unique_values = self.stats.unique_values,
            generation = self.stats.generation,
            "attribute committed"
        );
    }

    fn apply_pending(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return 0;
        }
        let mut changes = Vec::with_capacity(pending.len());
        let mut updater = self.enum_store.make_batch_updater();
        for (doc_id, values) in pending {
            let new: Vec<WeightedIndex> = match &self.values {
                DocValues::Single(_) if values.is_empty() => vec![WeightedIndex::new(updater.insert_default(), 1)],
                _ => values
                    .iter()
                    .map(|(value, weight)| WeightedIndex::new(updater.insert(value), *weight))
                    .collect(),
            };
            for v in &new {
                updater.inc_ref_count(v.index);
            }
            let old = match &mut self.values {
                DocValues::Single(mapping) => vec![WeightedIndex::new(mapping.set(doc_id, new[0].index), 1)],
                DocValues::Multi(mapping) => mapping.set(doc_id, &new),
            };
            changes.push(DocChange { doc_id, old, new });
        }
        if let Some(postings) = self.postings.as_mut() {
            update_postings(updater.store_mut(), postings, &changes);
        }
        for change in &changes {
            for v in &change.old {
                updater.dec_ref_count(v.index);
            }
        }
        updater.commit()
    }

    /// Freeze, tag held memory with the current generation, bump it and reclaim what
    /// no reader can reach any more.
    pub(crate) fn finish_generation(&mut self) {
        self.enum_store.freeze_dictionary();
        let current = self.generations.current_generation();
        self.enum_store.assign_generation(current);
        if let DocValues::Multi(mapping) = &mut self.values {
            mapping.assign_generation(current);
        }
        if let Some(postings) = self.postings.as_mut() {
            postings.assign_generation(current);
        }
        self.generations.inc_generation();
        self.reclaim_memory();
    }

    pub fn reclaim_memory(&mut self) {
        self.generations.update_oldest_used_generation();
        let oldest_used = self.generations.oldest_used_generation();
        self.enum_store.reclaim_memory(oldest_used);
        if let DocValues::Multi(mapping) = &mut self.values {
            mapping.reclaim_memory(oldest_used);
        }
        if let Some(postings) = self.postings.as_mut() {
            postings.reclaim_memory(oldest_used);
        }
    }

    fn compact(&mut self) -> bool {
        let strategy = self.config.compaction;
        self.enum_store.update_stat(&strategy);
        let mut compacted = false;
        if let Some(remapper) = self.enum_store.consider_compact_values(&strategy) {
            let docs = match &mut self.values {
                DocValues::Single(mapping) => mapping.remap(&remapper),
                DocValues::Multi(mapping) => mapping.remap(&remapper),
            };
            debug!(attribute = %self.name, moved = remapper.num_moved(), docs, "remapped enum indexes");
            remapper.done(&mut self.enum_store);
            compacted = true;
        }
        if self.enum_store.consider_compact_dictionary(&strategy) {
            compacted = true;
        }
        if let DocValues::Multi(mapping) = &mut self.values {
            compacted |= mapping.compact_worst(&strategy);
        }
        if let Some(postings) = self.postings.as_mut() {
            let spec = postings.should_compact(&strategy);
            let buffers = postings.start_compact(spec, &strategy);
            if !buffers.is_empty() {
                let filter: RoaringBitmap = buffers.iter().copied().collect();
                self.enum_store.normalize_posting_lists(
                    &mut |list| {
                        if list.valid() && filter.contains(list.buffer_id()) {
                            postings.move_list(list)
                        } else {
                            list
                        }
                    },
                    &filter,
                );
                postings.finish_compact(&buffers);
                compacted = true;
            }
        }
        compacted
    }

    fn update_stats(&mut self) {
        let (num_values, multi_value) = match &self.values {
            DocValues::Single(mapping) => {
                let docs = mapping.num_docs() as usize;
                (
                    docs as u64,
                    MemoryUsage::new(mapping.memory_bytes(), docs * std::mem::size_of::<u32>(), 0, 0),
                )
            }
            DocValues::Multi(mapping) => (mapping.total_values(), mapping.memory_usage()),
        };
        self.stats = AttributeStats {
            num_docs: self.num_docs(),
            num_values,
            unique_values: self.enum_store.num_uniques(),
            enum_store: self.enum_store.values_memory_usage(),
            dictionary: self.enum_store.dictionary_memory_usage(),
            multi_value,
            postings: self.postings.as_ref().map(PostingStore::memory_usage).unwrap_or_default(),
            enum_store_address_space: self.enum_store.values_address_space_usage(),
            generation: self.generations.current_generation(),
        };
    }

    pub fn stats(&self) -> &AttributeStats {
        &self.stats
    }

    pub fn reader(&self) -> EnumAttributeReader<T> {
        let values = match &self.values {
            DocValues::Single(mapping) => ValuesReader::Single(mapping.reader()),
            DocValues::Multi(mapping) => ValuesReader::Multi(mapping.reader()),
        };
        EnumAttributeReader::new(
            self.name.clone(),
            self.config.clone(),
            self.enum_store.reader(),
            values,
            self.postings.as_ref().map(PostingStore::reader),
            Arc::clone(&self.generations),
        )
    }
}

/// Dictionary entry owning the posting list of each value, with the value slot whose
/// weight the list records. Folded-equal values share an owner; the folded-first value
/// present in the document decides the weight.
fn posting_owners<T: EnumValue>(store: &EnumStore<T>, values: &[WeightedIndex]) -> Vec<(Index, WeightedIndex)> {
    let cmp = store.comparator();
    let mut owners: Vec<(Index, WeightedIndex)> = Vec::with_capacity(values.len());
    for v in values {
        let (owner, _) = store
            .posting_owner(v.index)
            .unwrap_or_else(|| panic!("enum {:?} has no dictionary entry", v.index));
        match owners.iter_mut().find(|(o, _)| *o == owner) {
            Some((_, kept)) => {
                if cmp.less(v.index, kept.index) {
                    *kept = *v;
                }
            }
            None => owners.push((owner, *v)),
        }
    }
    owners
}

#[derive(Default)]
struct PostingChange {
    adds: Vec<(u32, i32)>,
    removes: Vec<u32>,
}

fn update_postings<T: EnumValue>(store: &mut EnumStore<T>, postings: &mut PostingStore, changes: &[DocChange]) {
    let mut per_owner: BTreeMap<Index, PostingChange> = BTreeMap::new();
    for change in changes {
        let old = posting_owners(store, &change.old);
        let new = posting_owners(store, &change.new);
        for (owner, _) in &old {
            if !new.iter().any(|(o, _)| o == owner) {
                per_owner.entry(*owner).or_default().removes.push(change.doc_id);
            }
        }
        for (owner, v) in &new {
            let unchanged = old.iter().any(|(o, w)| o == owner && w.weight == v.weight);
            if !unchanged {
                per_owner.entry(*owner).or_default().adds.push((change.doc_id, v.weight));
            }
        }
    }
    for (owner, change) in per_owner {
        store.update_posting_list(owner, &mut |list| postings.apply(list, &change.adds, &change.removes));
    }
}
