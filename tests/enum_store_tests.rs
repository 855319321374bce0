use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use proptest::prelude::*;
use searchcore::attribute::EnumAttribute;
use searchcore::core::config::{
    AttributeConfig, BasicType, CollectionType, DictionaryConfig, DictionaryType, GrowStrategy, Matching,
};
use searchcore::core::generation::GenerationHandler;
use searchcore::datastore::compaction::CompactionStrategy;
use searchcore::enumstore::EnumStore;

fn small_grow() -> GrowStrategy {
    GrowStrategy {
        initial_entries: 8,
        grow_factor: 2.0,
    }
}

#[derive(Debug, Clone)]
enum Op {
    Insert(i64),
    Release(i64),
    Sweep,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0i64..24).prop_map(Op::Insert),
        2 => (0i64..24).prop_map(Op::Release),
        1 => Just(Op::Sweep),
    ]
}

fn dictionary_type() -> impl Strategy<Value = DictionaryType> {
    prop_oneof![
        Just(DictionaryType::Btree),
        Just(DictionaryType::Hash),
        Just(DictionaryType::BtreeAndHash),
    ]
}

proptest! {
    #[test]
    fn each_value_is_stored_once_with_its_reference_count(
        kind in dictionary_type(),
        ops in prop::collection::vec(op(), 1..200),
    ) {
        let mut store: EnumStore<i64> = EnumStore::new(DictionaryConfig::new(kind, Matching::Cased), small_grow());
        let mut counts: BTreeMap<i64, u32> = BTreeMap::new();
        for op in ops {
            match op {
                Op::Insert(v) => {
                    let before = store.find_index(&v);
                    let idx = store.insert(&v);
                    if let Some(before) = before {
                        prop_assert_eq!(before, idx);
                    }
                    *counts.entry(v).or_insert(0) += 1;
                }
                Op::Release(v) => {
                    if let Some(count) = counts.get_mut(&v).filter(|c| **c > 0) {
                        let idx = store.find_index(&v).unwrap();
                        *count -= 1;
                        prop_assert_eq!(store.dec_ref_count(idx), *count == 0);
                    }
                }
                Op::Sweep => {
                    store.free_unused_values();
                    counts.retain(|_, c| *c > 0);
                }
            }
        }
        store.free_unused_values();
        counts.retain(|_, c| *c > 0);

        prop_assert_eq!(store.num_uniques(), counts.len());
        for (value, count) in &counts {
            let idx = store.find_index(value).unwrap();
            prop_assert_eq!(store.get_value(idx), *value);
            prop_assert_eq!(store.get_ref_count(idx), *count);
        }
        for v in 0i64..24 {
            if !counts.contains_key(&v) {
                prop_assert!(store.find_index(&v).is_none());
            }
        }
    }
}

#[test]
fn folded_values_keep_one_posting_list_on_the_first_variant() {
    let config = AttributeConfig::new(BasicType::String, CollectionType::Array)
        .with_fast_search(true)
        .with_dictionary(DictionaryConfig::new(DictionaryType::Btree, Matching::Uncased));
    let mut attr: EnumAttribute<String> = EnumAttribute::new("fruit", config);
    let docs: Vec<u32> = (0..3).map(|_| attr.add_doc()).collect();
    attr.set_values(docs[0], vec![("apple".to_string(), 1)]).unwrap();
    attr.set_values(docs[1], vec![("Apple".to_string(), 1)]).unwrap();
    attr.set_values(docs[2], vec![("APPLE".to_string(), 1), ("pear".to_string(), 1)]).unwrap();
    attr.commit();

    let store = attr.enum_store();
    let leader = store.find_index(&"APPLE".to_string()).unwrap();
    for variant in ["apple", "Apple", "APPLE", "aPPLe"] {
        let (owner, list) = store.find_posting_list(&variant.to_string()).unwrap();
        assert_eq!(owner, leader);
        assert!(list.valid());
    }
    let mut with_payload = Vec::new();
    store.dictionary().for_each_entry(&mut |key, payload| {
        if payload.valid() {
            with_payload.push(store.get_value(key));
        }
    });
    assert_eq!(with_payload, vec!["APPLE".to_string(), "pear".to_string()]);

    // Dropping the leader hands the list to the next variant.
    attr.clear_doc(docs[2]).unwrap();
    attr.commit();
    let store = attr.enum_store();
    let (owner, _) = store.find_posting_list(&"apple".to_string()).unwrap();
    assert_eq!(store.get_value(owner), "Apple");
    let hits: Vec<u32> = attr
        .reader()
        .read_guard()
        .search(&"APPLE".to_string())
        .iter()
        .map(|p| p.doc_id)
        .collect();
    assert_eq!(hits, vec![docs[0], docs[1]]);
}

#[test]
fn guarded_reader_survives_compaction() {
    let generations = Arc::new(GenerationHandler::new());
    let config = AttributeConfig::new(BasicType::String, CollectionType::Single)
        .with_compaction(CompactionStrategy::eager());
    let mut attr: EnumAttribute<String> = EnumAttribute::with_generations("city", config, Arc::clone(&generations));
    let docs: Vec<u32> = (0..64).map(|_| attr.add_doc()).collect();
    for &doc in &docs {
        attr.update(doc, format!("{}-0", doc)).unwrap();
    }
    attr.commit();

    let reader = attr.reader();
    let stop = Arc::new(AtomicBool::new(false));
    let checker = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut rounds = 0u64;
            while !stop.load(Ordering::Acquire) || rounds == 0 {
                let guard = reader.read_guard();
                for doc in 0..guard.num_docs() {
                    let values = guard.values(doc);
                    assert_eq!(values.len(), 1);
                    let prefix = format!("{}-", doc);
                    assert!(values[0].0.starts_with(&prefix), "doc {} read {:?}", doc, values);
                }
                rounds += 1;
            }
            rounds
        })
    };

    // Every round replaces every value, leaving whole buffers dead for compaction.
    for round in 1..30 {
        for &doc in &docs {
            attr.update(doc, format!("{}-{}", doc, round)).unwrap();
        }
        attr.commit();
    }
    stop.store(true, Ordering::Release);
    assert!(checker.join().unwrap() > 0);

    for &doc in &docs {
        assert_eq!(attr.get_values(doc), vec![(format!("{}-29", doc), 1)]);
    }
    assert_eq!(attr.stats().unique_values, docs.len());
}

#[test]
fn held_values_stay_readable_until_the_guard_is_released() {
    let generations = Arc::new(GenerationHandler::new());
    let mut store: EnumStore<String> = EnumStore::new(DictionaryConfig::default(), small_grow());
    let indexes: Vec<_> = (0..20).map(|i| store.insert(&format!("v{:02}", i))).collect();
    store.freeze_dictionary();

    let guard = store.reader().read_guard(&generations);
    for &idx in indexes.iter().take(10) {
        store.dec_ref_count(idx);
    }
    assert_eq!(store.free_unused_values(), 10);
    store.freeze_dictionary();
    store.assign_generation(generations.current_generation());
    generations.inc_generation();
    generations.update_oldest_used_generation();
    store.reclaim_memory(generations.oldest_used_generation());

    assert_eq!(guard.get_value(indexes[0]).as_deref(), Some("v00"));
    assert_eq!(guard.num_uniques(), 20);
    drop(guard);

    generations.update_oldest_used_generation();
    store.reclaim_memory(generations.oldest_used_generation());
    assert_eq!(store.try_get_value(indexes[0]), None);
    assert_eq!(store.num_uniques(), 10);
}
