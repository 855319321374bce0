use std::path::Path;
use bytes::BytesMut;
use tracing::debug;
use crate::attribute::enum_attribute::{DocValues, EnumAttribute};
use crate::attribute::file_format::{self, FileKind, MappedFile};
use crate::attribute::multi_value::WeightedIndex;
use crate::core::config::CollectionType;
use crate::core::error::{Error, Result};
use crate::enumstore::enum_store::Index;
use crate::enumstore::loader::{EnumeratedLoader, EnumeratedPostingsLoader};
use crate::enumstore::value::EnumValue;

/// Saved enums and weights of each document, in document order.
struct SavedDocs {
    counts: Vec<u32>,
    enums: Vec<u32>,
    weights: Vec<i32>,
}

impl SavedDocs {
    fn docs(&self) -> impl Iterator<Item = (u32, &[u32], &[i32])> + '_ {
        let mut offset = 0usize;
        self.counts.iter().enumerate().map(move |(doc_id, &count)| {
            let range = offset..offset + count as usize;
            offset += count as usize;
            (doc_id as u32, &self.enums[range.clone()], &self.weights[range])
        })
    }
}

fn resolve_docs(
    saved: &SavedDocs,
    mut resolve: impl FnMut(u32, u32, i32) -> Result<Index>,
) -> Result<Vec<(u32, Vec<WeightedIndex>)>> {
    saved
        .docs()
        .map(|(doc_id, enums, weights)| {
            let indexes = enums
                .iter()
                .zip(weights)
                .map(|(&e, &w)| Ok(WeightedIndex::new(resolve(e, doc_id, w)?, w)))
                .collect::<Result<Vec<_>>>()?;
            Ok((doc_id, indexes))
        })
        .collect()
}

fn read_u32_file(dir: &Path, name: &str, kind: FileKind) -> Result<Vec<u32>> {
    let mapped = MappedFile::open(&kind.path(dir, name))?;
    let (header, body) = file_format::decode(kind, mapped.data())?;
    file_format::get_u32s(&header, body)
}

fn read_i32_file(dir: &Path, name: &str, kind: FileKind) -> Result<Vec<i32>> {
    let mapped = MappedFile::open(&kind.path(dir, name))?;
    let (header, body) = file_format::decode(kind, mapped.data())?;
    file_format::get_i32s(&header, body)
}

impl<T: EnumValue> EnumAttribute<T> {
    /// Write the committed state as enumerated files under `dir`: `.udat` with the
    /// distinct values in dictionary order, `.dat` with `enum - 1` per value slot, plus
    /// `.idx` counts for multi-value and `.weight` for weighted-set attributes.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let mut udat = BytesMut::new();
        let unique = self.enum_store.write_values(&mut udat);
        file_format::write_file(
            &FileKind::UniqueValues.path(dir, &self.name),
            FileKind::UniqueValues,
            unique as u64,
            &udat,
        )?;

        let enumerator = self.enum_store.make_enumerator();
        let num_docs = self.num_docs();
        match &self.values {
            DocValues::Single(mapping) => {
                let body = file_format::put_u32s((0..num_docs).map(|doc| enumerator.saved_enum(mapping.get(doc))));
                file_format::write_file(&FileKind::Enums.path(dir, &self.name), FileKind::Enums, num_docs as u64, &body)?;
            }
            DocValues::Multi(mapping) => {
                let mut counts = Vec::with_capacity(num_docs as usize);
                let mut enums = Vec::new();
                let mut weights = Vec::new();
                for doc in 0..num_docs {
                    let values = mapping.get(doc);
                    counts.push(values.len() as u32);
                    for v in values {
                        enums.push(enumerator.saved_enum(v.index));
                        weights.push(v.weight);
                    }
                }
                let slots = enums.len() as u64;
                file_format::write_file(
                    &FileKind::Counts.path(dir, &self.name),
                    FileKind::Counts,
                    num_docs as u64,
                    &file_format::put_u32s(counts),
                )?;
                file_format::write_file(
                    &FileKind::Enums.path(dir, &self.name),
                    FileKind::Enums,
                    slots,
                    &file_format::put_u32s(enums),
                )?;
                if self.config.collection == CollectionType::WeightedSet {
                    file_format::write_file(
                        &FileKind::Weights.path(dir, &self.name),
                        FileKind::Weights,
                        slots,
                        &file_format::put_i32s(weights),
                    )?;
                }
            }
        }
        debug!(attribute = %self.name, docs = num_docs, unique, dir = %dir.display(), "attribute saved");
        Ok(())
    }

    fn read_saved_docs(&self, dir: &Path) -> Result<SavedDocs> {
        let enums = read_u32_file(dir, &self.name, FileKind::Enums)?;
        let (counts, weights) = match self.config.collection {
            CollectionType::Single => (vec![1; enums.len()], vec![1; enums.len()]),
            CollectionType::Array => (read_u32_file(dir, &self.name, FileKind::Counts)?, vec![1; enums.len()]),
            CollectionType::WeightedSet => (
                read_u32_file(dir, &self.name, FileKind::Counts)?,
                read_i32_file(dir, &self.name, FileKind::Weights)?,
            ),
        };
        // Mismatched sizes come from the files, not from this process, so they are
        // reported as corrupt data instead of asserted.
        let slots: u64 = counts.iter().map(|&c| c as u64).sum();
        if slots != enums.len() as u64 || weights.len() != enums.len() {
            return Err(Error::corrupt(format!(
                "attribute '{}': counts sum to {}, {} enums, {} weights",
                self.name,
                slots,
                enums.len(),
                weights.len()
            )));
        }
        Ok(SavedDocs { counts, enums, weights })
    }

    /// Load files written by [`save`](Self::save) into this empty attribute. Values are
    /// re-sorted when the saved order does not match this attribute's dictionary, and
    /// posting lists are rebuilt for fast-search attributes.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        if self.num_docs() != 0 || self.has_pending_changes() {
            return Err(Error::invalid_state(format!("attribute '{}' must be empty to load", self.name)));
        }
        let udat = MappedFile::open(&FileKind::UniqueValues.path(dir, &self.name))?;
        let (udat_header, udat_body) = file_format::decode(FileKind::UniqueValues, udat.data())?;
        let saved = self.read_saved_docs(dir)?;
        let context = format!("attribute '{}'", self.name);

        let EnumAttribute {
            enum_store,
            values,
            postings,
            ..
        } = self;
        let mut place = |doc_id: u32, indexes: Vec<WeightedIndex>| match &mut *values {
            DocValues::Single(mapping) => {
                mapping.add_doc(indexes[0].index);
            }
            DocValues::Multi(mapping) => {
                let doc = mapping.add_doc();
                debug_assert_eq!(doc, doc_id);
                mapping.set(doc, &indexes);
            }
        };
        // Documents are placed only once every saved enum resolved, so a failed load
        // leaves the attribute empty.
        let loaded_unique = match postings.as_mut() {
            Some(postings) => {
                let mut loader = EnumeratedPostingsLoader::new(enum_store);
                let loaded = loader.load_unique_values(udat_body)?;
                let docs = match resolve_docs(&saved, |e, doc_id, w| loader.resolve(e, doc_id, w)) {
                    Ok(docs) => docs,
                    Err(err) => {
                        loader.abort();
                        return Err(err.context(context));
                    }
                };
                for (doc_id, indexes) in docs {
                    place(doc_id, indexes);
                }
                loader.finish(&mut |list| postings.make_list(list));
                loaded
            }
            None => {
                let mut loader = EnumeratedLoader::new(enum_store);
                let loaded = loader.load_unique_values(udat_body)?;
                let docs = match resolve_docs(&saved, |e, _, _| loader.resolve(e)) {
                    Ok(docs) => docs,
                    Err(err) => {
                        loader.abort();
                        return Err(err.context(context));
                    }
                };
                for (doc_id, indexes) in docs {
                    place(doc_id, indexes);
                }
                loader.build_dictionary();
                loader.free_unused_values();
                loaded
            }
        };
        self.commit();
        debug!(
            attribute = %self.name,
            docs = self.num_docs(),
            saved_unique = udat_header.entries,
            unique = loaded_unique,
            "attribute loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::attribute::enum_attribute::EnumAttribute;
    use crate::attribute::file_format::{self, FileKind};
    use crate::core::config::{AttributeConfig, BasicType, CollectionType, DictionaryConfig, DictionaryType, Matching};
    use crate::core::error::ErrorKind;

    #[test]
    fn load_rejects_non_empty_attribute_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut attr: EnumAttribute<i32> = EnumAttribute::new("a", AttributeConfig::default());
        assert_eq!(attr.load(dir.path()).unwrap_err().kind, ErrorKind::NotFound);
        attr.add_doc();
        attr.commit();
        attr.save(dir.path()).unwrap();
        assert_eq!(attr.load(dir.path()).unwrap_err().kind, ErrorKind::InvalidState);
    }

    #[test]
    fn out_of_range_enum_leaves_attribute_empty() {
        for fast_search in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let config = AttributeConfig::default().with_fast_search(fast_search);
            let mut attr: EnumAttribute<i32> = EnumAttribute::new("c", config.clone());
            for v in [10, 20, 30] {
                let doc = attr.add_doc();
                attr.set_values(doc, vec![(v, 1)]).unwrap();
            }
            attr.commit();
            attr.save(dir.path()).unwrap();

            let dat = FileKind::Enums.path(dir.path(), "c");
            file_format::write_file(&dat, FileKind::Enums, 3, &file_format::put_u32s([0, 1, 999])).unwrap();
            let mut loaded: EnumAttribute<i32> = EnumAttribute::new("c", config);
            let err = loaded.load(dir.path()).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Corrupt);
            assert!(err.context.contains("999"), "{}", err);
            assert_eq!(loaded.num_docs(), 0);
            assert!(!loaded.has_pending_changes());
            assert_eq!(loaded.enum_store().num_uniques(), 0);

            attr.save(dir.path()).unwrap();
            loaded.load(dir.path()).unwrap();
            assert_eq!(loaded.num_docs(), 3);
            assert_eq!(loaded.get_values(2), vec![(30, 1)]);
            assert_eq!(loaded.enum_store().num_uniques(), 3);
        }
    }

    #[test]
    fn weighted_set_round_trip_with_postings() {
        let dir = tempfile::tempdir().unwrap();
        let config = AttributeConfig::new(BasicType::String, CollectionType::WeightedSet)
            .with_fast_search(true)
            .with_dictionary(DictionaryConfig::new(DictionaryType::BtreeAndHash, Matching::Uncased));
        let mut attr: EnumAttribute<String> = EnumAttribute::new("tags", config.clone());
        let a = attr.add_doc();
        let b = attr.add_doc();
        attr.set_values(a, vec![("rust".to_string(), 3), ("Go".to_string(), -1)]).unwrap();
        attr.set_values(b, vec![("RUST".to_string(), 5)]).unwrap();
        attr.commit();
        attr.save(dir.path()).unwrap();

        let mut loaded: EnumAttribute<String> = EnumAttribute::new("tags", config);
        loaded.load(dir.path()).unwrap();
        assert_eq!(loaded.num_docs(), 2);
        assert_eq!(loaded.get_values(a), attr.get_values(a));
        assert_eq!(loaded.get_values(b), attr.get_values(b));
        let guard = loaded.reader().read_guard();
        let hits = guard.search(&"Rust".to_string());
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].weight, 5);
    }
}
