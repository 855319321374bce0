use crate::rank::environment::{IndexEnvironment, QueryEnvironment};
use crate::rank::executor::FeatureExecutor;
use crate::rank::feature_type::{AcceptInput, FeatureType};
use crate::rank::parameters::{Parameter, ParameterDescriptions};

/// Position of one output in the compiled executor list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureRef {
    pub executor: usize,
    pub output: usize,
}

impl FeatureRef {
    pub fn new(executor: usize, output: usize) -> Self {
        FeatureRef { executor, output }
    }
}

/// Prototype and setup logic of one feature.
///
/// The factory holds one prototype per base name and clones it through
/// [`create_instance`](Blueprint::create_instance) for every executor name the resolver
/// sets up. `setup` defines inputs, then describes outputs, in the order the executor
/// reads and writes them.
pub trait Blueprint: Send + Sync {
    fn base_name(&self) -> &str;

    fn create_instance(&self) -> Box<dyn Blueprint>;

    fn parameter_descriptions(&self) -> ParameterDescriptions {
        ParameterDescriptions::any()
    }

    fn setup(&mut self, env: &IndexEnvironment, params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool;

    fn create_executor(&self, env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor>;
}

/// Resolves dependency names on behalf of a blueprint being set up.
pub trait InputResolver {
    fn resolve_input(&mut self, feature_name: &str, accept: AcceptInput) -> Option<(FeatureRef, FeatureType)>;
}

/// Collects the inputs and outputs a blueprint declares during setup.
pub struct DependencyHandler<'c> {
    resolver: &'c mut dyn InputResolver,
    inputs: Vec<FeatureRef>,
    outputs: Vec<(String, FeatureType)>,
    failed_input: bool,
}

impl<'c> DependencyHandler<'c> {
    pub fn new(resolver: &'c mut dyn InputResolver) -> Self {
        DependencyHandler {
            resolver,
            inputs: Vec::new(),
            outputs: Vec::new(),
            failed_input: false,
        }
    }

    /// Resolve `feature_name` as the next input. `None` means resolution failed; the
    /// blueprint may still return from setup, the failure is already recorded.
    pub fn define_input(&mut self, feature_name: &str, accept: AcceptInput) -> Option<FeatureType> {
        assert!(self.outputs.is_empty(), "input '{}' defined after outputs", feature_name);
        match self.resolver.resolve_input(feature_name, accept) {
            Some((input, ty)) => {
                self.inputs.push(input);
                Some(ty)
            }
            None => {
                self.failed_input = true;
                None
            }
        }
    }

    pub fn describe_output(&mut self, name: &str, ty: FeatureType) {
        assert!(
            !self.outputs.iter().any(|(n, _)| n == name),
            "output '{}' described twice",
            name
        );
        self.outputs.push((name.to_string(), ty));
    }

    pub fn failed_input(&self) -> bool {
        self.failed_input
    }

    pub fn into_parts(self) -> (Vec<FeatureRef>, Vec<(String, FeatureType)>) {
        (self.inputs, self.outputs)
    }
}

/// A set-up blueprint with its wiring, in dependency order.
pub struct ExecutorSpec {
    pub name: String,
    pub blueprint: Box<dyn Blueprint>,
    pub inputs: Vec<FeatureRef>,
    pub output_names: Vec<String>,
    pub output_types: Vec<FeatureType>,
}
