use serde::{Serialize, Deserialize};
use std::collections::HashMap;

/// Local document id within one attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        DocId(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Array(Vec<FieldValue>),
    WeightedSet(Vec<(FieldValue, i32)>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Number(v) => Some(*v),
            FieldValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Number(v) => Some(*v as i64),
            FieldValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Opaque document payload handed to the feed boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub fields: HashMap<String, FieldValue>,
}

impl Document {
    pub fn new(id: DocId) -> Self {
        Document {
            id,
            fields: HashMap::new(),
        }
    }

    pub fn add_field(&mut self, name: String, value: FieldValue) {
        self.fields.insert(name, value);
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Partial update: assigns listed fields, leaves the rest untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub id: DocId,
    pub assignments: HashMap<String, FieldValue>,
    pub clears: Vec<String>,
}

impl DocumentUpdate {
    pub fn new(id: DocId) -> Self {
        DocumentUpdate {
            id,
            assignments: HashMap::new(),
            clears: Vec::new(),
        }
    }

    pub fn assign(mut self, field: &str, value: FieldValue) -> Self {
        self.assignments.insert(field.to_string(), value);
        self
    }

    pub fn clear(mut self, field: &str) -> Self {
        self.clears.push(field.to_string());
        self
    }
}
