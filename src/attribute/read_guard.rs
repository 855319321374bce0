use std::sync::Arc;
use roaring::RoaringBitmap;
use crate::attribute::multi_value::{MultiValueReader, WeightedIndex};
use crate::attribute::posting_store::{Posting, PostingStoreReader};
use crate::core::config::{AttributeConfig, BasicType, CollectionType};
use crate::core::generation::GenerationHandler;
use crate::core::types::FieldValue;
use crate::datastore::entry_ref::EntryRef;
use crate::datastore::rcu_vector::{RcuReader, RcuView};
use crate::enumstore::enum_store::Index;
use crate::enumstore::read_guard::{EnumStoreReadGuard, EnumStoreReader};
use crate::enumstore::value::EnumValue;

#[derive(Clone)]
pub(crate) enum ValuesReader {
    Single(RcuReader),
    Multi(MultiValueReader),
}

enum ValuesView {
    Single(RcuView),
    Multi { refs: RcuView, reader: MultiValueReader },
}

/// Cloneable, thread-safe handle for reading an attribute from query threads.
#[derive(Clone)]
pub struct EnumAttributeReader<T: EnumValue> {
    name: String,
    config: AttributeConfig,
    enum_store: EnumStoreReader<T>,
    values: ValuesReader,
    postings: Option<PostingStoreReader>,
    generations: Arc<GenerationHandler>,
}

impl<T: EnumValue> EnumAttributeReader<T> {
    pub(crate) fn new(
        name: String,
        config: AttributeConfig,
        enum_store: EnumStoreReader<T>,
        values: ValuesReader,
        postings: Option<PostingStoreReader>,
        generations: Arc<GenerationHandler>,
    ) -> Self {
        EnumAttributeReader {
            name,
            config,
            enum_store,
            values,
            postings,
            generations,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AttributeConfig {
        &self.config
    }

    /// Consistent view of the attribute as of the last commit. Memory it references
    /// stays alive until the guard is dropped.
    pub fn read_guard(&self) -> EnumAttributeReadGuard<T> {
        let enums = self.enum_store.read_guard(&self.generations);
        let values = match &self.values {
            ValuesReader::Single(reader) => ValuesView::Single(reader.view()),
            ValuesReader::Multi(reader) => ValuesView::Multi {
                refs: reader.refs().view(),
                reader: reader.clone(),
            },
        };
        EnumAttributeReadGuard {
            enums,
            values,
            postings: self.postings.clone(),
            collection: self.config.collection,
        }
    }
}

pub struct EnumAttributeReadGuard<T: EnumValue> {
    enums: EnumStoreReadGuard<T>,
    values: ValuesView,
    postings: Option<PostingStoreReader>,
    collection: CollectionType,
}

impl<T: EnumValue> EnumAttributeReadGuard<T> {
    pub fn enums(&self) -> &EnumStoreReadGuard<T> {
        &self.enums
    }

    pub fn num_docs(&self) -> u32 {
        match &self.values {
            ValuesView::Single(view) => view.len() as u32,
            ValuesView::Multi { refs, .. } => refs.len() as u32,
        }
    }

    pub fn indexes(&self, doc_id: u32) -> Vec<WeightedIndex> {
        match &self.values {
            ValuesView::Single(view) => view
                .get(doc_id as usize)
                .map(|raw| WeightedIndex::new(EntryRef::from_raw(raw), 1))
                .into_iter()
                .collect(),
            ValuesView::Multi { refs, reader } => refs
                .get(doc_id as usize)
                .map(|raw| reader.array(EntryRef::from_raw(raw)))
                .unwrap_or_default(),
        }
    }

    pub fn values(&self, doc_id: u32) -> Vec<(T, i32)> {
        self.indexes(doc_id)
            .into_iter()
            .filter_map(|v| self.enums.get_value(v.index).map(|value| (value, v.weight)))
            .collect()
    }

    pub fn value_count(&self, doc_id: u32) -> usize {
        self.indexes(doc_id).len()
    }

    pub fn first_value(&self, doc_id: u32) -> Option<T> {
        let first = self.indexes(doc_id).into_iter().next()?;
        self.enums.get_value(first.index)
    }

    fn scan(&self, matches: &dyn Fn(Index) -> bool) -> Vec<Posting> {
        let mut hits = Vec::new();
        for doc_id in 0..self.num_docs() {
            if let Some(v) = self.indexes(doc_id).into_iter().find(|v| matches(v.index)) {
                hits.push(Posting { doc_id, weight: v.weight });
            }
        }
        hits
    }

    /// Documents holding `term`, case-insensitively for folded attributes. Uses posting
    /// lists when the attribute has them, otherwise scans every document.
    pub fn search(&self, term: &T) -> Vec<Posting> {
        match &self.postings {
            Some(postings) => {
                let mut hits: Vec<Posting> = self
                    .enums
                    .matching_posting_lists(term)
                    .into_iter()
                    .flat_map(|list| postings.postings(list))
                    .collect();
                hits.sort_by_key(|p| p.doc_id);
                hits.dedup_by_key(|p| p.doc_id);
                hits
            }
            None => {
                let matching = self.enums.matching_enums(term);
                self.scan(&|idx| matching.contains(&idx))
            }
        }
    }

    /// Documents with a value in `[low, high)`.
    pub fn search_range(&self, low: &T, high: &T) -> RoaringBitmap {
        let range = self.enums.range(low, high);
        match &self.postings {
            Some(postings) => {
                let mut docs = RoaringBitmap::new();
                for (_, list) in range {
                    if list.valid() {
                        docs |= postings.doc_ids(list);
                    }
                }
                docs
            }
            None => {
                let keys: Vec<Index> = range.into_iter().map(|(k, _)| k).collect();
                self.scan(&|idx| keys.contains(&idx)).into_iter().map(|p| p.doc_id).collect()
            }
        }
    }
}

/// Type-erased read side used by rank features and the feed layer.
pub trait AttributeReader: Send + Sync {
    fn name(&self) -> &str;

    fn basic_type(&self) -> BasicType;

    fn collection(&self) -> CollectionType;

    fn make_read_view(&self) -> Box<dyn AttributeReadView>;
}

/// Guarded view of one attribute, values converted to numbers or field values.
pub trait AttributeReadView: Send {
    fn num_docs(&self) -> u32;

    fn value_count(&self, doc_id: u32) -> usize;

    /// First value as a number, 0 for documents without values.
    fn get_number(&self, doc_id: u32) -> f64;

    fn get_weighted_numbers(&self, doc_id: u32, out: &mut Vec<(f64, i32)>);

    fn get_fields(&self, doc_id: u32) -> Vec<(FieldValue, i32)>;
}

impl<T: EnumValue> AttributeReader for EnumAttributeReader<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn basic_type(&self) -> BasicType {
        self.config.basic_type
    }

    fn collection(&self) -> CollectionType {
        self.config.collection
    }

    fn make_read_view(&self) -> Box<dyn AttributeReadView> {
        Box::new(self.read_guard())
    }
}

impl<T: EnumValue> AttributeReadView for EnumAttributeReadGuard<T> {
    fn num_docs(&self) -> u32 {
        EnumAttributeReadGuard::num_docs(self)
    }

    fn value_count(&self, doc_id: u32) -> usize {
        EnumAttributeReadGuard::value_count(self, doc_id)
    }

    fn get_number(&self, doc_id: u32) -> f64 {
        self.first_value(doc_id).map(|v| v.as_number()).unwrap_or(0.0)
    }

    fn get_weighted_numbers(&self, doc_id: u32, out: &mut Vec<(f64, i32)>) {
        out.clear();
        out.extend(self.values(doc_id).into_iter().map(|(v, w)| (v.as_number(), w)));
    }

    fn get_fields(&self, doc_id: u32) -> Vec<(FieldValue, i32)> {
        let values = self.values(doc_id);
        match self.collection {
            CollectionType::Single => values.into_iter().take(1).map(|(v, w)| (v.to_field(), w)).collect(),
            _ => values.into_iter().map(|(v, w)| (v.to_field(), w)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use crate::attribute::enum_attribute::EnumAttribute;
    use crate::core::config::{AttributeConfig, BasicType, CollectionType};

    #[test]
    fn reader_in_another_thread_sees_committed_values_only() {
        let config = AttributeConfig::new(BasicType::Double, CollectionType::Single).with_fast_search(true);
        let mut attr: EnumAttribute<f64> = EnumAttribute::new("price", config);
        let docs: Vec<u32> = (0..4).map(|_| attr.add_doc()).collect();
        for (doc, price) in docs.iter().zip([10.0, 20.0, 10.0, 35.5]) {
            attr.update(*doc, price).unwrap();
        }
        attr.commit();
        attr.update(docs[3], 10.0).unwrap();

        let reader = attr.reader();
        let handle = thread::spawn(move || {
            let guard = reader.read_guard();
            let tens: Vec<u32> = guard.search(&10.0).iter().map(|p| p.doc_id).collect();
            let range: Vec<u32> = guard.search_range(&15.0, &40.0).iter().collect();
            (tens, range, guard.first_value(3))
        });
        let (tens, range, last) = handle.join().unwrap();
        assert_eq!(tens, vec![0, 2]);
        assert_eq!(range, vec![1, 3]);
        assert_eq!(last, Some(35.5));
    }

    #[test]
    fn scan_search_without_postings() {
        let config = AttributeConfig::new(BasicType::Int8, CollectionType::Array);
        let mut attr: EnumAttribute<i8> = EnumAttribute::new("flags", config);
        let a = attr.add_doc();
        let b = attr.add_doc();
        attr.set_values(a, vec![(1, 1), (2, 1)]).unwrap();
        attr.set_values(b, vec![(2, 1), (2, 1)]).unwrap();
        attr.commit();
        let guard = attr.reader().read_guard();
        assert_eq!(guard.search(&2).len(), 2);
        assert_eq!(guard.search(&1)[0].doc_id, a);
        assert_eq!(guard.value_count(b), 2);
        assert_eq!(guard.search_range(&0, &2).len(), 1);
    }
}
