use crate::attribute::read_guard::AttributeReadView;
use crate::rank::blueprint::{Blueprint, DependencyHandler};
use crate::rank::environment::{IndexEnvironment, QueryEnvironment};
use crate::rank::executor::{ConstantExecutor, FeatureExecutor, Inputs, Outputs};
use crate::rank::feature_type::FeatureType;
use crate::rank::parameters::{Parameter, ParameterDescriptions};

/// `attribute(name)` and `attribute(name, n)`.
///
/// Outputs the value of the first (or `n`th) element, its weight and the number of
/// values in the document. Documents without that element read 0 for value and weight.
#[derive(Default)]
pub struct AttributeBlueprint {
    attribute: String,
    element: usize,
}

struct AttributeExecutor {
    view: Box<dyn AttributeReadView>,
    element: usize,
    buffer: Vec<(f64, i32)>,
}

impl FeatureExecutor for AttributeExecutor {
    fn execute(&mut self, doc_id: u32, _inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>) {
        self.view.get_weighted_numbers(doc_id, &mut self.buffer);
        let (value, weight) = self.buffer.get(self.element).copied().unwrap_or((0.0, 0));
        outputs.set_number(0, value);
        outputs.set_number(1, weight as f64);
        outputs.set_number(2, self.buffer.len() as f64);
    }
}

impl Blueprint for AttributeBlueprint {
    fn base_name(&self) -> &str {
        "attribute"
    }

    fn create_instance(&self) -> Box<dyn Blueprint> {
        Box::new(AttributeBlueprint::default())
    }

    fn parameter_descriptions(&self) -> ParameterDescriptions {
        ParameterDescriptions::new()
            .desc()
            .attribute()
            .desc()
            .attribute()
            .number()
    }

    fn setup(&mut self, _env: &IndexEnvironment, params: &[Parameter], deps: &mut DependencyHandler<'_>) -> bool {
        self.attribute = params[0].value().to_string();
        if let Some(element) = params.get(1) {
            let n = element.as_number();
            if n < 0.0 || n.fract() != 0.0 {
                return false;
            }
            self.element = n as usize;
        }
        deps.describe_output("value", FeatureType::Number);
        deps.describe_output("weight", FeatureType::Number);
        deps.describe_output("count", FeatureType::Number);
        true
    }

    fn create_executor(&self, env: &QueryEnvironment<'_>) -> Box<dyn FeatureExecutor> {
        match env.index_env().attribute(&self.attribute) {
            Some(reader) => Box::new(AttributeExecutor {
                view: reader.make_read_view(),
                element: self.element,
                buffer: Vec::new(),
            }),
            None => Box::new(ConstantExecutor::new(vec![0.0, 0.0, 0.0])),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::attribute::enum_attribute::EnumAttribute;
    use crate::core::config::{AttributeConfig, BasicType, CollectionType};
    use crate::features::register_builtin_blueprints;
    use crate::rank::environment::{IndexEnvironment, MatchData, QueryEnvironment};
    use crate::rank::factory::BlueprintFactory;
    use crate::rank::program::RankProgram;
    use crate::rank::properties::Properties;
    use crate::rank::resolver::BlueprintResolver;

    #[test]
    fn reads_committed_attribute_values() {
        let config = AttributeConfig::new(BasicType::Int64, CollectionType::WeightedSet);
        let mut attr: EnumAttribute<i64> = EnumAttribute::new("tags", config);
        let a = attr.add_doc();
        let b = attr.add_doc();
        attr.set_values(a, vec![(10, 2), (20, 3)]).unwrap();
        attr.commit();

        let mut index_env = IndexEnvironment::new();
        index_env.add_attribute(Arc::new(attr.reader()));
        let index_env = Arc::new(index_env);
        let mut factory = BlueprintFactory::new();
        register_builtin_blueprints(&mut factory);
        let mut resolver = BlueprintResolver::new(Arc::new(factory), Arc::clone(&index_env));
        for seed in ["attribute(tags)", "attribute(tags).weight", "attribute(tags,1)", "attribute(tags).count"] {
            resolver.add_seed(seed);
        }
        assert!(resolver.compile(), "{:?}", resolver.warnings());

        let mut program = RankProgram::new(Arc::new(resolver));
        program.setup(MatchData::default(), &QueryEnvironment::new(&index_env), &Properties::new(), None);
        let seeds = program.get_seeds(true);
        let read = |program: &mut RankProgram, i: usize, doc: u32| program.as_number(seeds.resolve(i), doc);
        assert_eq!(read(&mut program, 0, a), 10.0);
        assert_eq!(read(&mut program, 1, a), 2.0);
        assert_eq!(read(&mut program, 2, a), 20.0);
        assert_eq!(read(&mut program, 3, a), 2.0);
        assert_eq!(read(&mut program, 3, b), 0.0);
        assert_eq!(read(&mut program, 0, b), 0.0);
    }

    #[test]
    fn unknown_attribute_fails_validation() {
        let mut factory = BlueprintFactory::new();
        register_builtin_blueprints(&mut factory);
        let mut resolver = BlueprintResolver::new(Arc::new(factory), Arc::new(IndexEnvironment::new()));
        resolver.add_seed("attribute(missing)");
        assert!(!resolver.compile());
        assert!(resolver.warnings()[0].contains("invalid parameters"));
    }
}
