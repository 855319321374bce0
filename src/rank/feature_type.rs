use std::fmt;
use std::sync::Arc;

/// Type of an object-valued feature, e.g. `tensor(x[3])`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueType(String);

impl ValueType {
    pub fn new(spec: impl Into<String>) -> Self {
        ValueType(spec.into())
    }

    pub fn dense_vector(size: usize) -> Self {
        ValueType(format!("tensor(x[{}])", size))
    }

    pub fn spec(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureType {
    Number,
    Object(ValueType),
}

impl FeatureType {
    pub fn is_object(&self) -> bool {
        matches!(self, FeatureType::Object(_))
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeatureType::Number => f.write_str("number"),
            FeatureType::Object(t) => write!(f, "object ({})", t.spec()),
        }
    }
}

/// What kind of input a blueprint accepts for a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptInput {
    Number,
    Object,
    Any,
}

impl AcceptInput {
    pub fn accepts(&self, ty: &FeatureType) -> bool {
        match self {
            AcceptInput::Any => true,
            AcceptInput::Number => !ty.is_object(),
            AcceptInput::Object => ty.is_object(),
        }
    }
}

/// Dense cells of an object value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectValue {
    cells: Vec<f64>,
}

impl ObjectValue {
    pub fn new(cells: Vec<f64>) -> Self {
        ObjectValue { cells }
    }

    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    /// Scalar view of the value: the sum of its cells.
    pub fn as_double(&self) -> f64 {
        self.cells.iter().sum()
    }
}

/// Storage cell for one executor output. The variant is fixed by the output's declared
/// [`FeatureType`] when the program is set up.
#[derive(Debug, Clone)]
pub enum NumberOrObject {
    Number(f64),
    Object(Arc<ObjectValue>),
}

impl NumberOrObject {
    pub fn for_type(ty: &FeatureType) -> Self {
        match ty {
            FeatureType::Number => NumberOrObject::Number(0.0),
            FeatureType::Object(_) => NumberOrObject::Object(Arc::new(ObjectValue::default())),
        }
    }

    pub fn as_number(&self) -> f64 {
        match self {
            NumberOrObject::Number(v) => *v,
            NumberOrObject::Object(_) => panic!("number read from an object output"),
        }
    }

    pub fn as_object(&self) -> &Arc<ObjectValue> {
        match self {
            NumberOrObject::Object(v) => v,
            NumberOrObject::Number(_) => panic!("object read from a number output"),
        }
    }
}
