use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};
use searchcore::attribute::EnumAttribute;
use searchcore::core::config::{
    AttributeConfig, BasicType, CollectionType, DictionaryConfig, DictionaryType, GrowStrategy, Matching,
};
use searchcore::datastore::compaction::CompactionStrategy;
use searchcore::enumstore::EnumStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_words(count: usize, distinct: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count).map(|_| format!("word{}", rng.gen_range(0..distinct))).collect()
}

/// Insert with heavy duplication for each dictionary backing
fn bench_insert(c: &mut Criterion) {
    let words = random_words(10_000, 1_000);
    let mut group = c.benchmark_group("enum_store_insert");

    for kind in [DictionaryType::Btree, DictionaryType::Hash, DictionaryType::BtreeAndHash] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", kind)), &kind, |b, &kind| {
            b.iter(|| {
                let mut store: EnumStore<String> =
                    EnumStore::new(DictionaryConfig::new(kind, Matching::Cased), GrowStrategy::default());
                for w in &words {
                    black_box(store.insert(w));
                }
                store.num_uniques()
            });
        });
    }

    group.finish();
}

/// Lookup through a guarded reader
fn bench_find(c: &mut Criterion) {
    let words = random_words(10_000, 1_000);
    let mut group = c.benchmark_group("enum_store_find");

    for kind in [DictionaryType::Btree, DictionaryType::Hash] {
        let mut store: EnumStore<String> =
            EnumStore::new(DictionaryConfig::new(kind, Matching::Cased), GrowStrategy::default());
        for w in &words {
            store.insert(w);
        }
        store.freeze_dictionary();
        group.bench_function(BenchmarkId::from_parameter(format!("{:?}", kind)), |b| {
            b.iter(|| words.iter().filter(|w| store.find_index(w).is_some()).count());
        });
    }

    group.finish();
}

/// Update and commit an attribute, compacting as values die
fn bench_attribute_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("attribute_commit");

    for docs in [1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(docs), &docs, |b, &docs| {
            let config = AttributeConfig::new(BasicType::String, CollectionType::Single)
                .with_fast_search(true)
                .with_compaction(CompactionStrategy::eager());
            let mut attr: EnumAttribute<String> = EnumAttribute::new("city", config);
            for _ in 0..docs {
                attr.add_doc();
            }
            let mut round = 0u32;
            b.iter(|| {
                round += 1;
                for doc in (0..docs).step_by(7) {
                    attr.update(doc, format!("city{}", (doc + round) % 500)).unwrap();
                }
                attr.commit();
            });
        });
    }

    group.finish();
}

/// Case-insensitive search over folded posting lists
fn bench_folded_search(c: &mut Criterion) {
    let config = AttributeConfig::new(BasicType::String, CollectionType::Array)
        .with_fast_search(true)
        .with_dictionary(DictionaryConfig::new(DictionaryType::BtreeAndHash, Matching::Uncased));
    let mut attr: EnumAttribute<String> = EnumAttribute::new("tags", config);
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..5_000 {
        let doc = attr.add_doc();
        let values = (0..3)
            .map(|_| {
                let v = format!("Tag{}", rng.gen_range(0..200));
                if rng.gen_bool(0.5) { (v.to_lowercase(), 1) } else { (v, 1) }
            })
            .collect();
        attr.set_values(doc, values).unwrap();
    }
    attr.commit();
    let reader = attr.reader();

    c.bench_function("folded_search", |b| {
        let guard = reader.read_guard();
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % 200;
            black_box(guard.search(&format!("TAG{}", i)).len())
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_find,
    bench_attribute_commit,
    bench_folded_search
);
criterion_main!(benches);
