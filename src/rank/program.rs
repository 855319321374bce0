use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;
use crate::core::config::RankConfig;
use crate::rank::blueprint::FeatureRef;
use crate::rank::environment::{MatchData, QueryEnvironment};
use crate::rank::executor::{lazy_execute, FeatureExecutor, OverrideExecutor, Slot, UnboxExecutor};
use crate::rank::feature_name::FeatureName;
use crate::rank::feature_type::{FeatureType, NumberOrObject, ObjectValue};
use crate::rank::profiler::ExecutionProfiler;
use crate::rank::properties::Properties;
use crate::rank::resolver::BlueprintResolver;

/// Document id constant executors are evaluated with during setup.
pub const SETUP_DOC_ID: u32 = u32::MAX;

/// Handle to one feature value of a rank program, evaluated on demand per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LazyValue {
    executor: usize,
    output: usize,
    is_object: bool,
}

impl LazyValue {
    pub fn is_object(&self) -> bool {
        self.is_object
    }
}

/// Named lazy values, e.g. the seeds of a program.
#[derive(Debug, Clone, Default)]
pub struct FeatureResolver {
    names: Vec<String>,
    values: Vec<LazyValue>,
}

impl FeatureResolver {
    pub fn num_features(&self) -> usize {
        self.names.len()
    }

    pub fn name_of(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    pub fn resolve(&self, idx: usize) -> LazyValue {
        self.values[idx]
    }

    pub fn find(&self, name: &str) -> Option<LazyValue> {
        self.names.iter().position(|n| n == name).map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, LazyValue)> {
        self.names.iter().map(String::as_str).zip(self.values.iter().copied())
    }
}

/// Executors of one compiled rank setup, instantiated for a single query.
///
/// Set up once, then driven by one thread. Each executor runs at most once per
/// document: asking for a value runs its executor, and the executor pulls the inputs
/// it reads, each of which also runs at most once for that document.
pub struct RankProgram {
    resolver: Arc<BlueprintResolver>,
    slots: Vec<Slot>,
    unboxed: HashMap<FeatureRef, usize>,
    match_data: MatchData,
    profiler: Option<ExecutionProfiler>,
    is_setup: bool,
}

impl RankProgram {
    pub fn new(resolver: Arc<BlueprintResolver>) -> Self {
        assert!(resolver.is_compiled(), "rank program built from an uncompiled resolver");
        assert!(
            resolver.warnings().is_empty(),
            "rank program built from a resolver that failed to compile"
        );
        RankProgram {
            resolver,
            slots: Vec::new(),
            unboxed: HashMap::new(),
            match_data: MatchData::default(),
            profiler: None,
            is_setup: false,
        }
    }

    /// Number overrides by canonical feature name, grouped per executor.
    fn prepare_overrides(&self, overrides: &Properties) -> BTreeMap<usize, Vec<(usize, f64)>> {
        let mut grouped: BTreeMap<usize, Vec<(usize, f64)>> = BTreeMap::new();
        for (key, values) in overrides.iter() {
            let Ok(name) = FeatureName::parse(key) else {
                debug!(feature = key, "ignoring override of malformed feature name");
                continue;
            };
            let Some(&feature) = self.resolver.feature_map().get(name.feature_name()) else {
                continue;
            };
            let value = values.first().and_then(|v| v.trim().parse::<f64>().ok());
            match (self.resolver.feature_type(feature), value) {
                (FeatureType::Number, Some(value)) => {
                    grouped.entry(feature.executor).or_default().push((feature.output, value));
                }
                _ => debug!(feature = key, "ignoring override"),
            }
        }
        grouped
    }

    fn push_slot(
        &mut self,
        name: String,
        executor: Box<dyn FeatureExecutor>,
        inputs: Vec<FeatureRef>,
        output_types: &[FeatureType],
        is_const: bool,
    ) -> usize {
        let idx = self.slots.len();
        if let Some(profiler) = self.profiler.as_mut() {
            profiler.register(idx, &name);
        }
        self.slots.push(Slot {
            name,
            executor,
            inputs,
            outputs: output_types.iter().map(NumberOrObject::for_type).collect(),
            last_doc_id: None,
            is_const: false,
        });
        if is_const {
            lazy_execute(&mut self.slots, idx, SETUP_DOC_ID, &self.match_data, None);
            self.slots[idx].is_const = true;
        }
        idx
    }

    fn inputs_const(&self, inputs: &[FeatureRef]) -> bool {
        inputs.iter().all(|input| self.slots[input.executor].is_const)
    }

    /// Create executors for the query, fold constants and apply `overrides`.
    pub fn setup(
        &mut self,
        match_data: MatchData,
        query_env: &QueryEnvironment<'_>,
        overrides: &Properties,
        profiler: Option<ExecutionProfiler>,
    ) {
        assert!(!self.is_setup, "rank program set up twice");
        self.is_setup = true;
        self.match_data = match_data;
        self.profiler = profiler;
        let resolver = Arc::clone(&self.resolver);
        let mut overrides = self.prepare_overrides(overrides);

        for (idx, spec) in resolver.executor_specs().iter().enumerate() {
            let mut executor = spec.blueprint.create_executor(query_env);
            if let Some(values) = overrides.remove(&idx) {
                executor = Box::new(OverrideExecutor::new(executor, values));
            }
            let is_const = executor.is_pure() && self.inputs_const(&spec.inputs);
            self.push_slot(spec.name.clone(), executor, spec.inputs.clone(), &spec.output_types, is_const);
        }

        let objects: BTreeSet<FeatureRef> = resolver
            .feature_map()
            .values()
            .copied()
            .filter(|f| resolver.feature_type(*f).is_object())
            .collect();
        for feature in objects {
            let spec = &resolver.executor_specs()[feature.executor];
            let name = format!("unbox({}.{})", spec.name, spec.output_names[feature.output]);
            let is_const = self.slots[feature.executor].is_const;
            let idx = self.push_slot(name, Box::new(UnboxExecutor), vec![feature], &[FeatureType::Number], is_const);
            self.unboxed.insert(feature, idx);
        }
        debug!(
            executors = self.num_executors(),
            constants = self.num_const_executors(),
            unboxed = self.unboxed.len(),
            "rank program set up"
        );
    }

    fn lazy_value(&self, feature: FeatureRef, unbox: bool) -> LazyValue {
        let is_object = self.resolver.feature_type(feature).is_object();
        match (is_object && unbox, self.unboxed.get(&feature)) {
            (true, Some(&idx)) => LazyValue {
                executor: idx,
                output: 0,
                is_object: false,
            },
            _ => LazyValue {
                executor: feature.executor,
                output: feature.output,
                is_object,
            },
        }
    }

    fn collect<'a>(&self, features: impl Iterator<Item = (&'a String, FeatureRef)>, unbox: bool) -> FeatureResolver {
        assert!(self.is_setup, "rank program used before setup");
        let mut resolver = FeatureResolver::default();
        for (name, feature) in features {
            resolver.names.push(name.clone());
            resolver.values.push(self.lazy_value(feature, unbox));
        }
        resolver
    }

    /// [`setup`](Self::setup) with a profiler when `config` enables one. Returns the
    /// seeds, unboxed as configured.
    pub fn setup_with_config(
        &mut self,
        match_data: MatchData,
        query_env: &QueryEnvironment<'_>,
        overrides: &Properties,
        config: &RankConfig,
    ) -> FeatureResolver {
        let profiler = config.enable_profiling.then(ExecutionProfiler::new);
        self.setup(match_data, query_env, overrides, profiler);
        self.get_seeds(config.unbox_seeds)
    }

    /// Seeds in the order they were added. With `unbox`, object seeds read as numbers.
    pub fn get_seeds(&self, unbox: bool) -> FeatureResolver {
        self.collect(self.resolver.seed_map().iter().map(|(n, f)| (n, *f)), unbox)
    }

    /// Every resolved feature name, sorted.
    pub fn get_all_features(&self, unbox: bool) -> FeatureResolver {
        let sorted: BTreeMap<&String, FeatureRef> = self.resolver.feature_map().iter().map(|(n, f)| (n, *f)).collect();
        self.collect(sorted.into_iter(), unbox)
    }

    fn execute(&mut self, value: LazyValue, doc_id: u32) -> &NumberOrObject {
        lazy_execute(&mut self.slots, value.executor, doc_id, &self.match_data, self.profiler.as_mut());
        &self.slots[value.executor].outputs[value.output]
    }

    pub fn as_number(&mut self, value: LazyValue, doc_id: u32) -> f64 {
        self.execute(value, doc_id).as_number()
    }

    pub fn as_object(&mut self, value: LazyValue, doc_id: u32) -> Arc<ObjectValue> {
        Arc::clone(self.execute(value, doc_id).as_object())
    }

    pub fn is_const(&self, value: LazyValue) -> bool {
        self.slots[value.executor].is_const
    }

    pub fn num_executors(&self) -> usize {
        self.slots.len()
    }

    pub fn num_const_executors(&self) -> usize {
        self.slots.iter().filter(|s| s.is_const).count()
    }

    pub fn executor_name(&self, idx: usize) -> &str {
        &self.slots[idx].name
    }

    /// Term match data for the search loop to fill before features are read.
    pub fn match_data_mut(&mut self) -> &mut MatchData {
        &mut self.match_data
    }

    pub fn profiler(&self) -> Option<&ExecutionProfiler> {
        self.profiler.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::features::register_builtin_blueprints;
    use crate::rank::blueprint::{Blueprint, DependencyHandler};
    use crate::rank::environment::IndexEnvironment;
    use crate::rank::executor::{Inputs, Outputs};
    use crate::rank::factory::BlueprintFactory;
    use crate::rank::parameters::Parameter;

    /// `counted` outputs the document id; `pureCount` outputs 7 and is pure. Both count
    /// their executions.
    struct CountingBlueprint {
        base: &'static str,
        calls: Arc<AtomicUsize>,
    }

    struct CountingExecutor {
        pure: bool,
        calls: Arc<AtomicUsize>,
    }

    impl FeatureExecutor for CountingExecutor {
        fn is_pure(&self) -> bool {
            self.pure
        }

        fn execute(&mut self, doc_id: u32, _inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            outputs.set_number(0, if self.pure { 7.0 } else { doc_id as f64 });
        }
    }

    impl Blueprint for CountingBlueprint {
        fn base_name(&self) -> &str {
            self.base
        }

        fn create_instance(&self) -> Box<dyn Blueprint> {
            Box::new(CountingBlueprint {
                base: self.base,
                calls: Arc::clone(&self.calls),
            })
        }

        fn setup(&mut self, _env: &IndexEnvironment, _params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool {
            deps.describe_output("out", FeatureType::Number);
            true
        }

        fn create_executor(&self, _env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor> {
            Box::new(CountingExecutor {
                pure: self.base == "pureCount",
                calls: Arc::clone(&self.calls),
            })
        }
    }

    struct Fixture {
        counted: Arc<AtomicUsize>,
        pure: Arc<AtomicUsize>,
        index_env: Arc<IndexEnvironment>,
        factory: Arc<BlueprintFactory>,
    }

    impl Fixture {
        fn new() -> Self {
            let counted = Arc::new(AtomicUsize::new(0));
            let pure = Arc::new(AtomicUsize::new(0));
            let mut factory = BlueprintFactory::new();
            register_builtin_blueprints(&mut factory);
            factory.add_prototype(Box::new(CountingBlueprint {
                base: "counted",
                calls: Arc::clone(&counted),
            }));
            factory.add_prototype(Box::new(CountingBlueprint {
                base: "pureCount",
                calls: Arc::clone(&pure),
            }));
            Fixture {
                counted,
                pure,
                index_env: Arc::new(IndexEnvironment::new()),
                factory: Arc::new(factory),
            }
        }

        fn program(&self, seeds: &[&str], overrides: &Properties, profiler: Option<ExecutionProfiler>) -> RankProgram {
            let mut resolver = BlueprintResolver::new(Arc::clone(&self.factory), Arc::clone(&self.index_env));
            for seed in seeds {
                resolver.add_seed(seed);
            }
            assert!(resolver.compile(), "{:?}", resolver.warnings());
            let mut program = RankProgram::new(Arc::new(resolver));
            let query_env = QueryEnvironment::new(&self.index_env);
            program.setup(MatchData::new(1), &query_env, overrides, profiler);
            program
        }
    }

    #[test]
    fn shared_input_runs_once_per_document() {
        let fixture = Fixture::new();
        let mut program = fixture.program(&["sum(counted)", "sum(counted,value(1))"], &Properties::new(), None);
        let seeds = program.get_seeds(true);
        let (a, b) = (seeds.resolve(0), seeds.resolve(1));

        assert_eq!(program.as_number(a, 5), 5.0);
        assert_eq!(program.as_number(b, 5), 6.0);
        assert_eq!(program.as_number(a, 5), 5.0);
        assert_eq!(fixture.counted.load(Ordering::SeqCst), 1);

        assert_eq!(program.as_number(b, 6), 7.0);
        assert_eq!(program.as_number(a, 6), 6.0);
        assert_eq!(fixture.counted.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn constants_are_folded_at_setup() {
        let fixture = Fixture::new();
        let mut program = fixture.program(
            &["constant(3).out", "sum(constant(3).out,counted)", "sum(pureCount,value(1))"],
            &Properties::new(),
            None,
        );
        assert_eq!(fixture.pure.load(Ordering::SeqCst), 1);
        let seeds = program.get_seeds(true);
        assert!(program.is_const(seeds.resolve(0)));
        assert!(!program.is_const(seeds.resolve(1)));
        assert!(program.is_const(seeds.resolve(2)));
        for doc_id in [1, 2, 10] {
            assert_eq!(program.as_number(seeds.resolve(0), doc_id), 3.0);
            assert_eq!(program.as_number(seeds.resolve(1), doc_id), 3.0 + doc_id as f64);
            assert_eq!(program.as_number(seeds.resolve(2), doc_id), 8.0);
        }
        assert_eq!(fixture.pure.load(Ordering::SeqCst), 1);
        // constant(3), pureCount, value(1), sum(pureCount,value(1))
        assert_eq!(program.num_const_executors(), 4);
    }

    #[test]
    fn overrides_replace_outputs() {
        let fixture = Fixture::new();
        let mut overrides = Properties::new();
        overrides.add("counted", "100").add("value(2)", "5").add("unknown", "1");
        let mut program = fixture.program(&["sum(counted,value(2))"], &overrides, None);
        let seed = program.get_seeds(false).resolve(0);
        assert_eq!(program.as_number(seed, 1), 105.0);
        assert!(!program.is_const(seed));
    }

    #[test]
    fn object_seeds_are_unboxed_on_request() {
        let fixture = Fixture::new();
        let mut program = fixture.program(&["vector(value(1),value(2))", "vector(counted,counted)"], &Properties::new(), None);
        let boxed = program.get_seeds(false);
        assert!(boxed.resolve(0).is_object());
        assert_eq!(program.as_object(boxed.resolve(0), 1).cells(), &[1.0, 2.0]);

        let unboxed = program.get_seeds(true);
        assert!(!unboxed.resolve(0).is_object());
        assert!(program.is_const(unboxed.resolve(0)));
        assert_eq!(program.as_number(unboxed.resolve(0), 1), 3.0);
        assert_eq!(program.as_number(unboxed.resolve(1), 4), 8.0);
        assert!(program.get_all_features(true).find("vector(counted,counted).out").is_some());
    }

    #[test]
    fn profiler_counts_executions() {
        let fixture = Fixture::new();
        let mut program = fixture.program(&["sum(counted)"], &Properties::new(), Some(ExecutionProfiler::new()));
        let seed = program.get_seeds(true).resolve(0);
        for doc_id in 0..3 {
            program.as_number(seed, doc_id);
        }
        let profiler = program.profiler().unwrap();
        assert_eq!(profiler.sample("counted").unwrap().count, 3);
        assert_eq!(profiler.sample("sum(counted)").unwrap().count, 3);
        assert_eq!(profiler.report().len(), 2);
    }

    #[test]
    fn rank_config_drives_profiling_and_unboxing() {
        let fixture = Fixture::new();
        let mut resolver = BlueprintResolver::new(Arc::clone(&fixture.factory), Arc::clone(&fixture.index_env));
        resolver.add_seed("vector(counted,value(1))");
        assert!(resolver.compile());
        let mut program = RankProgram::new(Arc::new(resolver));
        let query_env = QueryEnvironment::new(&fixture.index_env);
        let config = RankConfig {
            unbox_seeds: false,
            enable_profiling: true,
        };
        let seeds = program.setup_with_config(MatchData::new(1), &query_env, &Properties::new(), &config);
        assert!(seeds.resolve(0).is_object());
        assert_eq!(program.as_object(seeds.resolve(0), 4).cells(), &[4.0, 1.0]);
        assert_eq!(program.profiler().unwrap().sample("counted").unwrap().count, 1);

        let mut plain = fixture.program(&["value(1)"], &Properties::new(), None);
        assert!(plain.profiler().is_none());
        let value = plain.get_seeds(RankConfig::default().unbox_seeds).resolve(0);
        assert_eq!(plain.as_number(value, 0), 1.0);
    }

    #[test]
    #[should_panic(expected = "set up twice")]
    fn setup_is_one_shot() {
        let fixture = Fixture::new();
        let mut program = fixture.program(&["value(1)"], &Properties::new(), None);
        let query_env = QueryEnvironment::new(&fixture.index_env);
        program.setup(MatchData::default(), &query_env, &Properties::new(), None);
    }
}
