//! Built-in rank features.

pub mod value;
pub mod constant;
pub mod attribute;
pub mod sum;
pub mod vector;
pub mod reduce;

use crate::rank::factory::BlueprintFactory;

pub fn register_builtin_blueprints(factory: &mut BlueprintFactory) {
    factory.add_prototype(Box::new(value::ValueBlueprint::default()));
    factory.add_prototype(Box::new(constant::ConstantBlueprint::default()));
    factory.add_prototype(Box::new(attribute::AttributeBlueprint::default()));
    factory.add_prototype(Box::new(sum::SumBlueprint));
    factory.add_prototype(Box::new(vector::VectorBlueprint));
    factory.add_prototype(Box::new(reduce::ReduceBlueprint::default()));
}
