use tracing::debug;
use crate::rank::blueprint::{Blueprint, DependencyHandler};
use crate::rank::environment::{IndexEnvironment, QueryEnvironment};
use crate::rank::executor::{ConstantExecutor, FeatureExecutor};
use crate::rank::feature_type::FeatureType;
use crate::rank::parameters::{Parameter, ParameterDescriptions};

/// `constant(x).out`: a number given inline or named by the `constant(x).value` index
/// property.
#[derive(Default)]
pub struct ConstantBlueprint {
    value: f64,
}

impl Blueprint for ConstantBlueprint {
    fn base_name(&self) -> &str {
        "constant"
    }

    fn create_instance(&self) -> Box<dyn Blueprint> {
        Box::new(ConstantBlueprint::default())
    }

    fn parameter_descriptions(&self) -> ParameterDescriptions {
        ParameterDescriptions::new().desc().string()
    }

    fn setup(&mut self, env: &IndexEnvironment, params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool {
        let name = params[0].value();
        let value = match name.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => env
                .properties()
                .get(&format!("constant({}).value", name))
                .and_then(|v| v.trim().parse::<f64>().ok()),
        };
        let Some(value) = value else {
            debug!(constant = name, "constant has no numeric value");
            return false;
        };
        self.value = value;
        deps.describe_output("out", FeatureType::Number);
        true
    }

    fn create_executor(&self, _env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor> {
        Box::new(ConstantExecutor::new(vec![self.value]))
    }
}
