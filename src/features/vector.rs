use std::sync::Arc;
use crate::rank::blueprint::{Blueprint, DependencyHandler};
use crate::rank::environment::{IndexEnvironment, QueryEnvironment};
use crate::rank::executor::{FeatureExecutor, Inputs, Outputs};
use crate::rank::feature_type::{AcceptInput, FeatureType, ObjectValue, ValueType};
use crate::rank::parameters::{Parameter, ParameterDescriptions};

/// `vector(f1, f2, ...)`: the numbers as one dense object.
#[derive(Default)]
pub struct VectorBlueprint;

struct VectorExecutor;

impl FeatureExecutor for VectorExecutor {
    fn is_pure(&self) -> bool {
        true
    }

    fn execute(&mut self, _doc_id: u32, inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>) {
        let cells = (0..inputs.len()).map(|i| inputs.get_number(i)).collect();
        outputs.set_object(0, Arc::new(ObjectValue::new(cells)));
    }
}

impl Blueprint for VectorBlueprint {
    fn base_name(&self) -> &str {
        "vector"
    }

    fn create_instance(&self) -> Box<dyn Blueprint> {
        Box::new(VectorBlueprint)
    }

    fn parameter_descriptions(&self) -> ParameterDescriptions {
        ParameterDescriptions::new().desc().feature().feature().repeat(1)
    }

    fn setup(&mut self, _env: &IndexEnvironment, params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool {
        for p in params {
            deps.define_input(p.value(), AcceptInput::Number);
        }
        deps.describe_output("out", FeatureType::Object(ValueType::dense_vector(params.len())));
        true
    }

    fn create_executor(&self, _env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor> {
        Box::new(VectorExecutor)
    }
}
