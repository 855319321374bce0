use crate::rank::blueprint::{Blueprint, DependencyHandler};
use crate::rank::environment::{IndexEnvironment, QueryEnvironment};
use crate::rank::executor::{FeatureExecutor, Inputs, Outputs};
use crate::rank::feature_type::{AcceptInput, FeatureType};
use crate::rank::parameters::{Parameter, ParameterDescriptions};

/// `sum(f1, f2, ...)`
#[derive(Default)]
pub struct SumBlueprint;

struct SumExecutor;

impl FeatureExecutor for SumExecutor {
    fn is_pure(&self) -> bool {
        true
    }

    fn execute(&mut self, _doc_id: u32, inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>) {
        let mut sum = 0.0;
        for i in 0..inputs.len() {
            sum += inputs.get_number(i);
        }
        outputs.set_number(0, sum);
    }
}

impl Blueprint for SumBlueprint {
    fn base_name(&self) -> &str {
        "sum"
    }

    fn create_instance(&self) -> Box<dyn Blueprint> {
        Box::new(SumBlueprint)
    }

    fn parameter_descriptions(&self) -> ParameterDescriptions {
        ParameterDescriptions::new().desc().feature().feature().repeat(1)
    }

    fn setup(&mut self, _env: &IndexEnvironment, params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool {
        for p in params {
            deps.define_input(p.value(), AcceptInput::Number);
        }
        deps.describe_output("out", FeatureType::Number);
        true
    }

    fn create_executor(&self, _env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor> {
        Box::new(SumExecutor)
    }
}
