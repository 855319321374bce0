pub mod feature_name;
pub mod feature_type;
pub mod properties;
pub mod parameters;
pub mod environment;
pub mod blueprint;
pub mod factory;
pub mod resolver;
pub mod executor;
pub mod profiler;
pub mod program;

pub use blueprint::{Blueprint, DependencyHandler, ExecutorSpec, FeatureRef};
pub use environment::{IndexEnvironment, MatchData, QueryEnvironment, TermFieldMatchData};
pub use executor::{FeatureExecutor, Inputs, Outputs};
pub use factory::BlueprintFactory;
pub use feature_name::{FeatureName, FeatureNameBuilder};
pub use feature_type::{AcceptInput, FeatureType, NumberOrObject, ObjectValue, ValueType};
pub use parameters::{Parameter, ParameterDescriptions, ParameterType};
pub use profiler::ExecutionProfiler;
pub use program::{FeatureResolver, LazyValue, RankProgram};
pub use properties::Properties;
pub use resolver::{BlueprintResolver, MAX_DEP_DEPTH};
