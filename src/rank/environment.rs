use std::collections::HashMap;
use std::sync::Arc;
use crate::attribute::read_guard::AttributeReader;
use crate::rank::properties::Properties;

/// Index-level context for blueprint setup: attribute readers and rank properties.
#[derive(Default)]
pub struct IndexEnvironment {
    attributes: HashMap<String, Arc<dyn AttributeReader>>,
    properties: Properties,
}

impl IndexEnvironment {
    pub fn new() -> Self {
        IndexEnvironment::default()
    }

    pub fn with_properties(properties: Properties) -> Self {
        IndexEnvironment {
            attributes: HashMap::new(),
            properties,
        }
    }

    pub fn add_attribute(&mut self, reader: Arc<dyn AttributeReader>) {
        self.attributes.insert(reader.name().to_string(), reader);
    }

    pub fn attribute(&self, name: &str) -> Option<&Arc<dyn AttributeReader>> {
        self.attributes.get(name)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }
}

/// Per-query context handed to blueprints when executors are created.
pub struct QueryEnvironment<'a> {
    index_env: &'a IndexEnvironment,
    properties: Properties,
}

impl<'a> QueryEnvironment<'a> {
    pub fn new(index_env: &'a IndexEnvironment) -> Self {
        QueryEnvironment {
            index_env,
            properties: Properties::new(),
        }
    }

    pub fn with_properties(index_env: &'a IndexEnvironment, properties: Properties) -> Self {
        QueryEnvironment { index_env, properties }
    }

    pub fn index_env(&self) -> &'a IndexEnvironment {
        self.index_env
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

/// Match information for one query term in the current document.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TermFieldMatchData {
    pub doc_id: Option<u32>,
    pub weight: i32,
}

impl TermFieldMatchData {
    pub fn matches(&self, doc_id: u32) -> bool {
        self.doc_id == Some(doc_id)
    }
}

/// Term match slots filled by the search loop before features are evaluated.
#[derive(Debug, Clone, Default)]
pub struct MatchData {
    terms: Vec<TermFieldMatchData>,
}

impl MatchData {
    pub fn new(num_terms: usize) -> Self {
        MatchData {
            terms: vec![TermFieldMatchData::default(); num_terms],
        }
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn term(&self, idx: usize) -> Option<&TermFieldMatchData> {
        self.terms.get(idx)
    }

    pub fn term_mut(&mut self, idx: usize) -> Option<&mut TermFieldMatchData> {
        self.terms.get_mut(idx)
    }
}
