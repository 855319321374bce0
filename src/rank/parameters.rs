use crate::rank::environment::IndexEnvironment;
use crate::rank::feature_name::FeatureName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Feature,
    Number,
    String,
    Attribute,
}

/// A validated blueprint parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    kind: ParameterType,
    value: String,
    number: f64,
}

impl Parameter {
    pub fn kind(&self) -> ParameterType {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Parsed value of a `Number` parameter, 0 for other kinds.
    pub fn as_number(&self) -> f64 {
        self.number
    }
}

/// One accepted parameter list. The last `repeat` types may occur any number of times.
#[derive(Debug, Clone, Default)]
struct Signature {
    types: Vec<ParameterType>,
    repeat: usize,
}

impl Signature {
    fn type_at(&self, idx: usize) -> ParameterType {
        let fixed = self.types.len() - self.repeat;
        if idx < fixed {
            self.types[idx]
        } else {
            self.types[fixed + (idx - fixed) % self.repeat]
        }
    }

    fn check_count(&self, count: usize) -> Result<(), String> {
        let fixed = self.types.len() - self.repeat;
        let ok = if self.repeat == 0 {
            count == self.types.len()
        } else {
            count >= fixed && (count - fixed) % self.repeat == 0
        };
        if ok {
            Ok(())
        } else if self.repeat == 0 {
            Err(format!("expected {} parameter(s), got {}", self.types.len(), count))
        } else {
            Err(format!("expected {} + n*{} parameters, got {}", fixed, self.repeat, count))
        }
    }
}

fn check(env: &IndexEnvironment, idx: usize, kind: ParameterType, value: &str) -> Result<Parameter, String> {
    let mut number = 0.0;
    match kind {
        ParameterType::Number => {
            number = value
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("parameter {} ('{}') is not a number", idx, value))?;
        }
        ParameterType::Attribute => {
            if env.attribute(value).is_none() {
                return Err(format!("parameter {} ('{}') is not an attribute", idx, value));
            }
        }
        ParameterType::Feature => {
            FeatureName::parse(value).map_err(|_| format!("parameter {} ('{}') is not a feature name", idx, value))?;
        }
        ParameterType::String => {}
    }
    Ok(Parameter {
        kind,
        value: value.to_string(),
        number,
    })
}

/// The parameter lists a blueprint accepts, tried in order.
///
/// ```ignore
/// ParameterDescriptions::new().desc().attribute().desc().attribute().number()
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParameterDescriptions {
    signatures: Vec<Signature>,
    unchecked: bool,
}

impl ParameterDescriptions {
    pub fn new() -> Self {
        ParameterDescriptions::default()
    }

    /// Accept any parameters as strings.
    pub fn any() -> Self {
        ParameterDescriptions {
            signatures: Vec::new(),
            unchecked: true,
        }
    }

    /// Start a new signature.
    pub fn desc(mut self) -> Self {
        self.signatures.push(Signature::default());
        self
    }

    fn push(mut self, kind: ParameterType) -> Self {
        match self.signatures.last_mut() {
            Some(sig) => sig.types.push(kind),
            None => self.signatures.push(Signature {
                types: vec![kind],
                repeat: 0,
            }),
        }
        self
    }

    pub fn feature(self) -> Self {
        self.push(ParameterType::Feature)
    }

    pub fn number(self) -> Self {
        self.push(ParameterType::Number)
    }

    pub fn string(self) -> Self {
        self.push(ParameterType::String)
    }

    pub fn attribute(self) -> Self {
        self.push(ParameterType::Attribute)
    }

    /// Let the last `n` types of the current signature repeat.
    pub fn repeat(mut self, n: usize) -> Self {
        if let Some(sig) = self.signatures.last_mut() {
            assert!(n > 0 && n <= sig.types.len(), "cannot repeat {} of {} types", n, sig.types.len());
            sig.repeat = n;
        }
        self
    }

    /// Match `params` against the signatures. Returns the first match or the reason the
    /// last signature rejected them.
    pub fn validate(&self, env: &IndexEnvironment, params: &[String]) -> Result<Vec<Parameter>, String> {
        if self.unchecked {
            return params
                .iter()
                .enumerate()
                .map(|(i, p)| check(env, i, ParameterType::String, p))
                .collect();
        }
        let mut reason = String::from("no parameter signature");
        for sig in &self.signatures {
            let matched = sig.check_count(params.len()).and_then(|_| {
                params
                    .iter()
                    .enumerate()
                    .map(|(i, p)| check(env, i, sig.type_at(i), p))
                    .collect::<Result<Vec<_>, String>>()
            });
            match matched {
                Ok(parameters) => return Ok(parameters),
                Err(e) => reason = e,
            }
        }
        Err(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::attribute::enum_attribute::EnumAttribute;
    use crate::core::config::AttributeConfig;

    fn params(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn signatures_are_tried_in_order() {
        let mut env = IndexEnvironment::new();
        let attr: EnumAttribute<i32> = EnumAttribute::new("age", AttributeConfig::default());
        env.add_attribute(Arc::new(attr.reader()));
        let desc = ParameterDescriptions::new().desc().attribute().desc().attribute().number();

        assert_eq!(desc.validate(&env, &params(&["age"])).unwrap()[0].kind(), ParameterType::Attribute);
        let two = desc.validate(&env, &params(&["age", " 2.5"])).unwrap();
        assert_eq!(two[1].as_number(), 2.5);
        assert!(desc.validate(&env, &params(&["height"])).is_err());
        let err = desc.validate(&env, &params(&["age", "x"])).unwrap_err();
        assert!(err.contains("not a number"), "{}", err);
    }

    #[test]
    fn repeated_types() {
        let env = IndexEnvironment::new();
        let desc = ParameterDescriptions::new().desc().string().feature().repeat(1);
        assert!(desc.validate(&env, &params(&["op"])).is_ok());
        assert!(desc.validate(&env, &params(&["op", "a", "b(c)"])).is_ok());
        assert!(desc.validate(&env, &params(&["op", "a", "b("])).is_err());
        assert!(desc.validate(&env, &params(&[])).is_err());
        assert_eq!(ParameterDescriptions::any().validate(&env, &params(&["x("])).unwrap()[0].value(), "x(");
    }
}
