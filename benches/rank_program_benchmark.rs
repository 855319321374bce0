use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};
use searchcore::attribute::EnumAttribute;
use searchcore::core::config::{AttributeConfig, BasicType, CollectionType};
use searchcore::features::register_builtin_blueprints;
use searchcore::rank::{
    BlueprintFactory, BlueprintResolver, ExecutionProfiler, IndexEnvironment, MatchData, Properties,
    QueryEnvironment, RankProgram,
};
use std::sync::Arc;
use rand::Rng;

const NUM_DOCS: u32 = 10_000;

fn index_env() -> Arc<IndexEnvironment> {
    let mut rng = rand::thread_rng();
    let mut price: EnumAttribute<f64> =
        EnumAttribute::new("price", AttributeConfig::new(BasicType::Double, CollectionType::Single));
    let mut tags: EnumAttribute<i32> =
        EnumAttribute::new("tags", AttributeConfig::new(BasicType::Int32, CollectionType::WeightedSet));
    for _ in 0..NUM_DOCS {
        let doc = price.add_doc();
        price.update(doc, rng.gen_range(0.0..100.0)).unwrap();
        tags.add_doc();
        let values = (0..rng.gen_range(0..6)).map(|_| (rng.gen_range(0..50), rng.gen_range(1..10))).collect();
        tags.set_values(doc, values).unwrap();
    }
    price.commit();
    tags.commit();

    let mut properties = Properties::new();
    properties.add("constant(boost).value", "1.5");
    let mut env = IndexEnvironment::with_properties(properties);
    env.add_attribute(Arc::new(price.reader()));
    env.add_attribute(Arc::new(tags.reader()));
    Arc::new(env)
}

fn build_program(env: &Arc<IndexEnvironment>, seeds: &[&str], profiler: Option<ExecutionProfiler>) -> RankProgram {
    let mut factory = BlueprintFactory::new();
    register_builtin_blueprints(&mut factory);
    let mut resolver = BlueprintResolver::new(Arc::new(factory), Arc::clone(env));
    for seed in seeds {
        resolver.add_seed(seed);
    }
    assert!(resolver.compile(), "{:?}", resolver.warnings());
    let mut program = RankProgram::new(Arc::new(resolver));
    program.setup(MatchData::new(0), &QueryEnvironment::new(env), &Properties::new(), profiler);
    program
}

const SEEDS: [&str; 3] = [
    "sum(attribute(price),constant(boost))",
    "sum(attribute(tags).count,attribute(tags).weight,attribute(price))",
    "reduce(vector(attribute(price),attribute(tags),constant(boost)),max)",
];

/// Resolve and set up a program from scratch
fn bench_compile(c: &mut Criterion) {
    let env = index_env();
    c.bench_function("rank_compile_and_setup", |b| {
        b.iter(|| black_box(build_program(&env, &SEEDS, None).num_executors()));
    });
}

/// Evaluate every seed for every document
fn bench_evaluate(c: &mut Criterion) {
    let env = index_env();
    let mut group = c.benchmark_group("rank_evaluate");

    for profiled in [false, true] {
        group.bench_with_input(BenchmarkId::new("all_docs", if profiled { "profiled" } else { "plain" }), &profiled, |b, &profiled| {
            let mut program = build_program(&env, &SEEDS, profiled.then(ExecutionProfiler::new));
            let seeds = program.get_seeds(true);
            b.iter(|| {
                let mut total = 0.0;
                for doc_id in 0..NUM_DOCS {
                    for i in 0..seeds.num_features() {
                        total += program.as_number(seeds.resolve(i), doc_id);
                    }
                }
                black_box(total)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_evaluate);
criterion_main!(benches);
