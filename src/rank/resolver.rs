use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::rank::blueprint::{Blueprint, DependencyHandler, ExecutorSpec, FeatureRef, InputResolver};
use crate::rank::environment::IndexEnvironment;
use crate::rank::factory::BlueprintFactory;
use crate::rank::feature_name::FeatureName;
use crate::rank::feature_type::{AcceptInput, FeatureType};

/// Maximum number of nested dependencies being set up at once.
pub const MAX_DEP_DEPTH: usize = 256;

/// Frames shown in an error trace; deeper stacks show both ends.
pub const MAX_TRACE_SIZE: usize = 16;

/// Stack for the thread that runs blueprint setup, which recurses once per dependency
/// level.
const RESOLVE_STACK_SIZE: usize = 16 * 1024 * 1024;

struct Frame {
    executor_name: String,
    feature_name: String,
}

/// Resolution state while compiling. Blueprints reach it through
/// [`DependencyHandler`] and may re-enter [`resolve_feature`](Compiler::resolve_feature)
/// for their own inputs; the explicit frame stack bounds that recursion.
struct Compiler<'a> {
    factory: &'a BlueprintFactory,
    index_env: &'a IndexEnvironment,
    specs: Vec<ExecutorSpec>,
    feature_map: HashMap<String, FeatureRef>,
    setup_set: HashSet<String>,
    failed_set: HashSet<String>,
    stack: Vec<Frame>,
    errors: Vec<String>,
}

impl<'a> Compiler<'a> {
    fn new(factory: &'a BlueprintFactory, index_env: &'a IndexEnvironment) -> Self {
        Compiler {
            factory,
            index_env,
            specs: Vec::new(),
            feature_map: HashMap::new(),
            setup_set: HashSet::new(),
            failed_set: HashSet::new(),
            stack: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn make_trace(&self) -> String {
        let frames: Vec<&Frame> = self.stack.iter().rev().collect();
        let line = |f: &&Frame| format!("\n  ... needed by rank feature '{}'", f.feature_name);
        if frames.len() <= MAX_TRACE_SIZE {
            return frames.iter().map(line).collect();
        }
        let half = MAX_TRACE_SIZE / 2;
        let mut trace: String = frames[..half].iter().map(line).collect();
        trace.push_str(&format!("\n  (skipped {} entries)", frames.len() - 2 * half));
        trace.extend(frames[frames.len() - half..].iter().map(line));
        trace
    }

    /// Record a failure for `feature_name` and mark every executor being set up as
    /// failed.
    fn fail(&mut self, feature_name: &str, reason: &str) -> Option<(FeatureRef, FeatureType)> {
        let message = format!("invalid rank feature '{}': {}{}", feature_name, reason, self.make_trace());
        self.errors.push(message);
        for frame in &self.stack {
            self.failed_set.insert(frame.executor_name.clone());
        }
        None
    }

    fn verify_type(&mut self, feature_name: &str, feature: FeatureRef, accept: AcceptInput) -> Option<(FeatureRef, FeatureType)> {
        let ty = self.specs[feature.executor].output_types[feature.output].clone();
        if accept.accepts(&ty) {
            return Some((feature, ty));
        }
        let expected = match accept {
            AcceptInput::Number => "number",
            AcceptInput::Object => "object",
            AcceptInput::Any => "any",
        };
        self.fail(feature_name, &format!("expected {} input, but was {}", expected, ty))
    }

    fn resolve_feature(&mut self, feature_name: &str, accept: AcceptInput) -> Option<(FeatureRef, FeatureType)> {
        let name = match FeatureName::parse(feature_name) {
            Ok(name) => name,
            Err(_) => return self.fail(feature_name, "malformed name"),
        };
        if let Some(&feature) = self.feature_map.get(name.feature_name()) {
            return self.verify_type(name.feature_name(), feature, accept);
        }
        let executor_name = name.executor_name().to_string();
        if self.failed_set.contains(&executor_name) {
            return self.fail(name.feature_name(), "already failed");
        }
        if self.setup_set.contains(&executor_name) {
            return self.fail(name.feature_name(), &format!("unknown output: '{}'", name.output()));
        }
        if self.stack.len() >= MAX_DEP_DEPTH {
            return self.fail(name.feature_name(), "dependency graph too deep");
        }
        if self.stack.iter().any(|frame| frame.executor_name == executor_name) {
            return self.fail(name.feature_name(), "dependency cycle detected");
        }
        let Some(blueprint) = self.factory.create_blueprint(name.base_name()) else {
            return self.fail(name.feature_name(), &format!("unknown basename: '{}'", name.base_name()));
        };
        self.stack.push(Frame {
            executor_name: executor_name.clone(),
            feature_name: name.feature_name().to_string(),
        });
        let spec = self.setup_blueprint(&name, blueprint);
        self.stack.pop();
        let spec = spec?;

        let executor = self.specs.len();
        for (output, output_name) in spec.output_names.iter().enumerate() {
            let feature = FeatureRef::new(executor, output);
            if output == 0 {
                self.feature_map.insert(executor_name.clone(), feature);
            }
            self.feature_map.insert(format!("{}.{}", executor_name, output_name), feature);
        }
        self.setup_set.insert(executor_name);
        self.specs.push(spec);

        match self.feature_map.get(name.feature_name()) {
            Some(&feature) => self.verify_type(name.feature_name(), feature, accept),
            None => self.fail(name.feature_name(), &format!("unknown output: '{}'", name.output())),
        }
    }

    /// Validate parameters and run setup with the frame for `name` on the stack.
    fn setup_blueprint(&mut self, name: &FeatureName, mut blueprint: Box<dyn Blueprint>) -> Option<ExecutorSpec> {
        let index_env = self.index_env;
        let params = match blueprint.parameter_descriptions().validate(index_env, name.parameters()) {
            Ok(params) => params,
            Err(reason) => {
                self.fail(name.feature_name(), &format!("invalid parameters: {}", reason));
                return None;
            }
        };
        let mut deps = DependencyHandler::new(self);
        let ok = blueprint.setup(index_env, &params, &mut deps);
        let failed_input = deps.failed_input();
        let (inputs, outputs) = deps.into_parts();
        if failed_input {
            return None;
        }
        if !ok {
            self.fail(name.feature_name(), "invalid parameters");
            return None;
        }
        if outputs.is_empty() {
            self.fail(name.feature_name(), "has no output value");
            return None;
        }
        debug_assert!(inputs.iter().all(|i| i.executor < self.specs.len()));
        let (output_names, output_types) = outputs.into_iter().unzip();
        Some(ExecutorSpec {
            name: name.executor_name().to_string(),
            blueprint,
            inputs,
            output_names,
            output_types,
        })
    }
}

struct Resolved {
    specs: Vec<ExecutorSpec>,
    feature_map: HashMap<String, FeatureRef>,
    seed_map: Vec<(String, FeatureRef)>,
    errors: Vec<String>,
}

fn resolve_seeds(factory: &BlueprintFactory, index_env: &IndexEnvironment, seeds: &[String]) -> Resolved {
    let mut compiler = Compiler::new(factory, index_env);
    let mut seed_map = Vec::with_capacity(seeds.len());
    for seed in seeds {
        if let Some((feature, _)) = compiler.resolve_feature(seed, AcceptInput::Any) {
            let name = FeatureName::parse(seed)
                .map(|n| n.feature_name().to_string())
                .unwrap_or_else(|_| seed.clone());
            seed_map.push((name, feature));
        }
        debug_assert!(compiler.stack.is_empty());
    }
    Resolved {
        specs: compiler.specs,
        feature_map: compiler.feature_map,
        seed_map,
        errors: compiler.errors,
    }
}

impl InputResolver for Compiler<'_> {
    fn resolve_input(&mut self, feature_name: &str, accept: AcceptInput) -> Option<(FeatureRef, FeatureType)> {
        self.resolve_feature(feature_name, accept)
    }
}

/// Turns seed feature names into a topologically ordered list of executor specs.
///
/// Every executor's inputs have lower indexes than the executor itself. `compile` runs
/// once; afterwards the resolver is shared read-only by the rank programs built from it.
pub struct BlueprintResolver {
    factory: Arc<BlueprintFactory>,
    index_env: Arc<IndexEnvironment>,
    seeds: Vec<String>,
    specs: Vec<ExecutorSpec>,
    feature_map: HashMap<String, FeatureRef>,
    seed_map: Vec<(String, FeatureRef)>,
    warnings: Vec<String>,
    compiled: bool,
}

impl BlueprintResolver {
    pub fn new(factory: Arc<BlueprintFactory>, index_env: Arc<IndexEnvironment>) -> Self {
        BlueprintResolver {
            factory,
            index_env,
            seeds: Vec::new(),
            specs: Vec::new(),
            feature_map: HashMap::new(),
            seed_map: Vec::new(),
            warnings: Vec::new(),
            compiled: false,
        }
    }

    pub fn add_seed(&mut self, feature_name: &str) {
        assert!(!self.compiled, "seed '{}' added after compile", feature_name);
        self.seeds.push(feature_name.to_string());
    }

    /// Resolve every seed and its dependencies. Returns false if anything failed; the
    /// reasons are in [`warnings`](Self::warnings).
    pub fn compile(&mut self) -> bool {
        assert!(!self.compiled, "blueprint resolver compiled twice");
        self.compiled = true;
        let factory = &*self.factory;
        let index_env = &*self.index_env;
        let seeds = &self.seeds;
        let run = move || resolve_seeds(factory, index_env, seeds);
        let resolved = std::thread::scope(|scope| {
            match std::thread::Builder::new()
                .name("rank-resolve".to_string())
                .stack_size(RESOLVE_STACK_SIZE)
                .spawn_scoped(scope, run)
            {
                Ok(handle) => handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
                Err(e) => {
                    debug!(error = %e, "resolving on the calling thread");
                    run()
                }
            }
        });
        self.specs = resolved.specs;
        self.feature_map = resolved.feature_map;
        self.seed_map = resolved.seed_map;
        self.warnings = resolved.errors;
        let ok = self.warnings.is_empty();
        if ok {
            debug!(seeds = self.seeds.len(), executors = self.specs.len(), "rank setup compiled");
        } else {
            warn!(failures = self.warnings.len(), "rank setup failed to compile:\n{}", self.warnings.join("\n"));
        }
        ok
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn executor_specs(&self) -> &[ExecutorSpec] {
        &self.specs
    }

    pub fn feature_map(&self) -> &HashMap<String, FeatureRef> {
        &self.feature_map
    }

    /// Resolved seeds by canonical name, in the order they were added.
    pub fn seed_map(&self) -> &[(String, FeatureRef)] {
        &self.seed_map
    }

    pub fn feature_type(&self, feature: FeatureRef) -> &FeatureType {
        &self.specs[feature.executor].output_types[feature.output]
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn index_env(&self) -> &Arc<IndexEnvironment> {
        &self.index_env
    }
}
