use crate::rank::blueprint::{Blueprint, DependencyHandler};
use crate::rank::environment::{IndexEnvironment, QueryEnvironment};
use crate::rank::executor::{ConstantExecutor, FeatureExecutor};
use crate::rank::feature_type::FeatureType;
use crate::rank::parameters::{Parameter, ParameterDescriptions};

/// `value(a, b, ...)`: one constant output per parameter, named `0`, `1`, ...
#[derive(Default)]
pub struct ValueBlueprint {
    values: Vec<f64>,
}

impl Blueprint for ValueBlueprint {
    fn base_name(&self) -> &str {
        "value"
    }

    fn create_instance(&self) -> Box<dyn Blueprint> {
        Box::new(ValueBlueprint::default())
    }

    fn parameter_descriptions(&self) -> ParameterDescriptions {
        ParameterDescriptions::new().desc().number().number().repeat(1)
    }

    fn setup(&mut self, _env: &IndexEnvironment, params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool {
        for (i, p) in params.iter().enumerate() {
            self.values.push(p.as_number());
            deps.describe_output(&i.to_string(), FeatureType::Number);
        }
        true
    }

    fn create_executor(&self, _env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor> {
        Box::new(ConstantExecutor::new(self.values.clone()))
    }
}
