use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use searchcore::core::config::{AttributeConfig, BasicType, CollectionType};
use searchcore::core::generation::GenerationHandler;
use searchcore::core::types::{DocId, Document, FieldValue};
use searchcore::features::register_builtin_blueprints;
use searchcore::feed::AttributeWriter;
use searchcore::rank::{
    AcceptInput, Blueprint, BlueprintFactory, BlueprintResolver, DependencyHandler, FeatureExecutor, FeatureType,
    IndexEnvironment, Inputs, MatchData, Outputs, Parameter, ParameterDescriptions, Properties, QueryEnvironment,
    RankProgram, MAX_DEP_DEPTH,
};

/// `ping(x)` needs `pong(x)` and `pong(x)` needs `ping(x)`.
struct PingPong {
    base: &'static str,
    other: &'static str,
}

/// `chain(n)` needs `chain(n-1)`; `chain(0)` is a leaf.
struct Chain;

/// Outputs the document id and counts how often it ran.
struct DocCounter {
    calls: Arc<AtomicUsize>,
}

struct DocCounterExecutor {
    calls: Arc<AtomicUsize>,
}

struct Leaf;

impl FeatureExecutor for Leaf {
    fn is_pure(&self) -> bool {
        true
    }

    fn execute(&mut self, _doc_id: u32, _inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>) {
        outputs.set_number(0, 1.0);
    }
}

impl FeatureExecutor for DocCounterExecutor {
    fn execute(&mut self, doc_id: u32, _inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        outputs.set_number(0, doc_id as f64);
    }
}

impl Blueprint for PingPong {
    fn base_name(&self) -> &str {
        self.base
    }

    fn create_instance(&self) -> Box<dyn Blueprint> {
        Box::new(PingPong {
            base: self.base,
            other: self.other,
        })
    }

    fn parameter_descriptions(&self) -> ParameterDescriptions {
        ParameterDescriptions::new().desc().string()
    }

    fn setup(&mut self, _env: &IndexEnvironment, params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool {
        deps.define_input(&format!("{}({})", self.other, params[0].value()), AcceptInput::Number);
        deps.describe_output("out", FeatureType::Number);
        true
    }

    fn create_executor(&self, _env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor> {
        Box::new(Leaf)
    }
}

impl Blueprint for Chain {
    fn base_name(&self) -> &str {
        "chain"
    }

    fn create_instance(&self) -> Box<dyn Blueprint> {
        Box::new(Chain)
    }

    fn parameter_descriptions(&self) -> ParameterDescriptions {
        ParameterDescriptions::new().desc().number()
    }

    fn setup(&mut self, _env: &IndexEnvironment, params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool {
        let n = params[0].as_number() as u64;
        if n > 0 {
            deps.define_input(&format!("chain({})", n - 1), AcceptInput::Number);
        }
        deps.describe_output("out", FeatureType::Number);
        true
    }

    fn create_executor(&self, _env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor> {
        Box::new(Leaf)
    }
}

impl Blueprint for DocCounter {
    fn base_name(&self) -> &str {
        "docid"
    }

    fn create_instance(&self) -> Box<dyn Blueprint> {
        Box::new(DocCounter {
            calls: Arc::clone(&self.calls),
        })
    }

    fn setup(&mut self, _env: &IndexEnvironment, _params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool {
        deps.describe_output("out", FeatureType::Number);
        true
    }

    fn create_executor(&self, _env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor> {
        Box::new(DocCounterExecutor {
            calls: Arc::clone(&self.calls),
        })
    }
}

fn factory(calls: &Arc<AtomicUsize>) -> Arc<BlueprintFactory> {
    let mut factory = BlueprintFactory::new();
    register_builtin_blueprints(&mut factory);
    factory.add_prototype(Box::new(PingPong { base: "ping", other: "pong" }));
    factory.add_prototype(Box::new(PingPong { base: "pong", other: "ping" }));
    factory.add_prototype(Box::new(Chain));
    factory.add_prototype(Box::new(DocCounter {
        calls: Arc::clone(calls),
    }));
    Arc::new(factory)
}

fn resolve(seeds: &[&str], index_env: Arc<IndexEnvironment>, calls: &Arc<AtomicUsize>) -> BlueprintResolver {
    let mut resolver = BlueprintResolver::new(factory(calls), index_env);
    for seed in seeds {
        resolver.add_seed(seed);
    }
    let ok = resolver.compile();
    assert_eq!(ok, resolver.warnings().is_empty());
    resolver
}

#[test]
fn mutual_dependencies_are_reported_as_cycles() {
    let calls = Arc::new(AtomicUsize::new(0));
    let resolver = resolve(&["ping(x)", "docid"], Arc::new(IndexEnvironment::new()), &calls);
    let warning = &resolver.warnings()[0];
    assert!(warning.starts_with("invalid rank feature 'ping(x)': dependency cycle detected"), "{}", warning);
    assert!(warning.contains("needed by rank feature 'pong(x)'"));
    assert!(warning.contains("needed by rank feature 'ping(x)'"));
    assert_eq!(resolver.warnings().len(), 1);
}

#[test]
fn dependency_depth_is_bounded() {
    let calls = Arc::new(AtomicUsize::new(0));
    let deepest = format!("chain({})", MAX_DEP_DEPTH - 1);
    let resolver = resolve(&[deepest.as_str()], Arc::new(IndexEnvironment::new()), &calls);
    assert!(resolver.warnings().is_empty(), "{:?}", resolver.warnings());
    assert_eq!(resolver.executor_specs().len(), MAX_DEP_DEPTH);

    let too_deep = format!("chain({})", MAX_DEP_DEPTH);
    let resolver = resolve(&[too_deep.as_str()], Arc::new(IndexEnvironment::new()), &calls);
    assert_eq!(resolver.warnings().len(), 1);
    assert!(resolver.warnings()[0].contains("dependency graph too deep"));
}

#[test]
fn shared_inputs_run_once_per_document_and_constants_once_per_program() {
    let calls = Arc::new(AtomicUsize::new(0));
    let index_env = Arc::new(IndexEnvironment::new());
    let resolver = resolve(
        &["constant(3).out", "sum(constant(3).out,docid)", "sum(docid,docid,value(2))"],
        Arc::clone(&index_env),
        &calls,
    );
    assert!(resolver.warnings().is_empty(), "{:?}", resolver.warnings());

    let mut program = RankProgram::new(Arc::new(resolver));
    program.setup(MatchData::new(0), &QueryEnvironment::new(&index_env), &Properties::new(), None);
    let seeds = program.get_seeds(true);
    let (constant, plus_three, twice) = (seeds.resolve(0), seeds.resolve(1), seeds.resolve(2));
    assert!(program.is_const(constant));
    assert!(!program.is_const(plus_three));

    for doc_id in 1..=10u32 {
        assert_eq!(program.as_number(twice, doc_id), 2.0 * doc_id as f64 + 2.0);
        assert_eq!(program.as_number(plus_three, doc_id), doc_id as f64 + 3.0);
        assert_eq!(program.as_number(constant, doc_id), 3.0);
        assert_eq!(calls.load(Ordering::SeqCst), doc_id as usize);
    }
    // Asking again for the last document reuses its values.
    program.as_number(twice, 10);
    assert_eq!(calls.load(Ordering::SeqCst), 10);
}

#[test]
fn ranking_reads_fed_attribute_values() {
    let generations = Arc::new(GenerationHandler::new());
    let mut writer = AttributeWriter::new(generations);
    writer
        .add_attribute("price", AttributeConfig::new(BasicType::Double, CollectionType::Single))
        .unwrap();
    writer
        .add_attribute("tags", AttributeConfig::new(BasicType::Int32, CollectionType::WeightedSet))
        .unwrap();
    for (id, price, tags) in [(0u32, 10.5, vec![(1, 4)]), (1, 2.0, vec![(1, 1), (2, 9), (3, 2)]), (2, 7.25, vec![])] {
        let mut doc = Document::new(DocId(id));
        doc.add_field("price".into(), FieldValue::Number(price));
        doc.add_field(
            "tags".into(),
            FieldValue::WeightedSet(tags.into_iter().map(|(v, w)| (FieldValue::Integer(v), w)).collect()),
        );
        writer.put(&doc).unwrap();
    }
    writer.commit();

    let mut properties = Properties::new();
    properties.add("constant(boost).value", "2");
    let mut index_env = IndexEnvironment::with_properties(properties);
    for name in ["price", "tags"] {
        index_env.add_attribute(writer.reader(name).unwrap());
    }
    let index_env = Arc::new(index_env);

    let calls = Arc::new(AtomicUsize::new(0));
    let resolver = resolve(
        &[
            "sum(attribute(price),constant(boost))",
            "attribute(tags).count",
            "reduce(vector(attribute(price),constant(boost)),max)",
        ],
        Arc::clone(&index_env),
        &calls,
    );
    assert!(resolver.warnings().is_empty(), "{:?}", resolver.warnings());
    let mut program = RankProgram::new(Arc::new(resolver));
    program.setup(MatchData::new(0), &QueryEnvironment::new(&index_env), &Properties::new(), None);

    let seeds = program.get_seeds(true);
    let expected = [(12.5, 1.0, 10.5), (4.0, 3.0, 2.0), (9.25, 0.0, 7.25)];
    for (doc_id, (sum, count, max)) in expected.into_iter().enumerate() {
        let doc_id = doc_id as u32;
        assert_eq!(program.as_number(seeds.resolve(0), doc_id), sum);
        assert_eq!(program.as_number(seeds.resolve(1), doc_id), count);
        assert_eq!(program.as_number(seeds.resolve(2), doc_id), max);
    }
}
