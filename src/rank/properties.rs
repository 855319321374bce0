use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// Multi-valued string properties: rank settings, constants and feature overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    values: BTreeMap<String, Vec<String>>,
}

impl Properties {
    pub fn new() -> Self {
        Properties::default()
    }

    pub fn add(&mut self, key: &str, value: &str) -> &mut Self {
        self.values.entry(key.to_string()).or_default().push(value.to_string());
        self
    }

    pub fn lookup(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lookup(key).first().map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Vec<String> {
        self.values.remove(key).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Add every key of `other`, keeping values already present.
    pub fn import(&mut self, other: &Properties) {
        for (key, values) in other.iter() {
            for value in values {
                self.add(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_valued_keys() {
        let mut props = Properties::new();
        props.add("a", "1").add("a", "2").add("b", "x");
        assert_eq!(props.lookup("a"), &["1".to_string(), "2".to_string()]);
        assert_eq!(props.get("b"), Some("x"));
        assert!(props.lookup("c").is_empty());

        let mut merged = Properties::new();
        merged.add("a", "0");
        merged.import(&props);
        assert_eq!(merged.lookup("a").len(), 3);
        assert_eq!(merged.remove("b"), vec!["x".to_string()]);
        assert_eq!(merged.len(), 1);
    }
}
