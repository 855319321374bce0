use crate::rank::blueprint::{Blueprint, DependencyHandler};
use crate::rank::environment::{IndexEnvironment, QueryEnvironment};
use crate::rank::executor::{FeatureExecutor, Inputs, Outputs};
use crate::rank::feature_type::{AcceptInput, FeatureType};
use crate::rank::parameters::{Parameter, ParameterDescriptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Sum,
    Avg,
    Min,
    Max,
    Prod,
    Count,
}

impl Aggregator {
    pub fn from_name(name: &str) -> Option<Aggregator> {
        match name {
            "sum" => Some(Aggregator::Sum),
            "avg" => Some(Aggregator::Avg),
            "min" => Some(Aggregator::Min),
            "max" => Some(Aggregator::Max),
            "prod" => Some(Aggregator::Prod),
            "count" => Some(Aggregator::Count),
            _ => None,
        }
    }

    /// Aggregate `cells`; empty input gives 0.
    pub fn apply(&self, cells: &[f64]) -> f64 {
        if cells.is_empty() {
            return 0.0;
        }
        match self {
            Aggregator::Sum => cells.iter().sum(),
            Aggregator::Avg => cells.iter().sum::<f64>() / cells.len() as f64,
            Aggregator::Min => cells.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregator::Max => cells.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregator::Prod => cells.iter().product(),
            Aggregator::Count => cells.len() as f64,
        }
    }
}

/// `reduce(object, op)`: aggregate the cells of an object feature to a number.
pub struct ReduceBlueprint {
    aggregator: Aggregator,
}

impl Default for ReduceBlueprint {
    fn default() -> Self {
        ReduceBlueprint {
            aggregator: Aggregator::Sum,
        }
    }
}

struct ReduceExecutor {
    aggregator: Aggregator,
}

impl FeatureExecutor for ReduceExecutor {
    fn is_pure(&self) -> bool {
        true
    }

    fn execute(&mut self, _doc_id: u32, inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>) {
        let value = inputs.get_object(0);
        outputs.set_number(0, self.aggregator.apply(value.cells()));
    }
}

impl Blueprint for ReduceBlueprint {
    fn base_name(&self) -> &str {
        "reduce"
    }

    fn create_instance(&self) -> Box<dyn Blueprint> {
        Box::new(ReduceBlueprint::default())
    }

    fn parameter_descriptions(&self) -> ParameterDescriptions {
        ParameterDescriptions::new().desc().feature().string()
    }

    fn setup(&mut self, _env: &IndexEnvironment, params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool {
        let Some(aggregator) = Aggregator::from_name(params[1].value()) else {
            return false;
        };
        self.aggregator = aggregator;
        deps.define_input(params[0].value(), AcceptInput::Object);
        deps.describe_output("out", FeatureType::Number);
        true
    }

    fn create_executor(&self, _env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor> {
        Box::new(ReduceExecutor {
            aggregator: self.aggregator,
        })
    }
}
