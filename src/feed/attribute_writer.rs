use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use crate::attribute::{create_attribute, AttributeReader, AttributeVector};
use crate::core::config::{AttributeConfig, Config};
use crate::core::error::{Error, Result};
use crate::core::generation::GenerationHandler;
use crate::core::types::{DocId, Document, DocumentUpdate};

/// Applies documents to the attribute columns of one document type.
///
/// Document ids address attribute docs directly; columns grow to cover the highest id
/// seen. Fields without a column are ignored.
pub struct AttributeWriter {
    attributes: BTreeMap<String, Box<dyn AttributeVector>>,
    generations: Arc<GenerationHandler>,
}

impl AttributeWriter {
    pub fn new(generations: Arc<GenerationHandler>) -> Self {
        AttributeWriter {
            attributes: BTreeMap::new(),
            generations,
        }
    }

    /// One column per configured attribute.
    pub fn from_config(config: &Config, generations: Arc<GenerationHandler>) -> Result<Self> {
        let mut writer = AttributeWriter::new(generations);
        for (name, attribute) in &config.attributes {
            writer.add_attribute(name, attribute.clone())?;
        }
        Ok(writer)
    }

    pub fn add_attribute(&mut self, name: &str, config: AttributeConfig) -> Result<()> {
        if self.attributes.contains_key(name) {
            return Err(Error::invalid_argument(format!("attribute '{}' already exists", name)));
        }
        let mut attribute = create_attribute(name, config, Arc::clone(&self.generations));
        let num_docs = self.num_docs();
        while attribute.num_docs() < num_docs {
            attribute.add_doc();
        }
        self.attributes.insert(name.to_string(), attribute);
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&dyn AttributeVector> {
        self.attributes.get(name).map(|a| a.as_ref())
    }

    pub fn reader(&self, name: &str) -> Option<Arc<dyn AttributeReader>> {
        self.attributes.get(name).map(|a| a.make_reader())
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn num_docs(&self) -> u32 {
        self.attributes.values().map(|a| a.num_docs()).max().unwrap_or(0)
    }

    fn ensure_doc(&mut self, id: DocId) {
        for attribute in self.attributes.values_mut() {
            while attribute.num_docs() <= id.value() {
                attribute.add_doc();
            }
        }
    }

    /// Replace every column value of the document. Columns the document has no field for
    /// are cleared.
    pub fn put(&mut self, document: &Document) -> Result<()> {
        self.ensure_doc(document.id);
        let doc_id = document.id.value();
        for (name, attribute) in self.attributes.iter_mut() {
            match document.get_field(name) {
                Some(value) => attribute.update_field(doc_id, value)?,
                None => attribute.clear_doc(doc_id)?,
            }
        }
        debug!(doc_id, "put applied to attributes");
        Ok(())
    }

    pub fn update(&mut self, update: &DocumentUpdate) -> Result<()> {
        self.ensure_doc(update.id);
        let doc_id = update.id.value();
        for (name, value) in &update.assignments {
            if let Some(attribute) = self.attributes.get_mut(name) {
                attribute.update_field(doc_id, value)?;
            }
        }
        for name in &update.clears {
            if let Some(attribute) = self.attributes.get_mut(name) {
                attribute.clear_doc(doc_id)?;
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, id: DocId) -> Result<()> {
        if id.value() >= self.num_docs() {
            return Ok(());
        }
        for attribute in self.attributes.values_mut() {
            attribute.clear_doc(id.value())?;
        }
        Ok(())
    }

    pub fn commit(&mut self) {
        for attribute in self.attributes.values_mut() {
            attribute.commit();
        }
    }

    /// Save the committed state of every column under `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        for (name, attribute) in &self.attributes {
            attribute.save(dir).map_err(|e| e.context(format!("saving '{}'", name)))?;
        }
        info!(attributes = self.attributes.len(), docs = self.num_docs(), dir = %dir.display(), "attributes saved");
        Ok(())
    }

    /// Load every column from `dir`. Columns must still be empty.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        for (name, attribute) in self.attributes.iter_mut() {
            attribute.load(dir).map_err(|e| e.context(format!("loading '{}'", name)))?;
        }
        // Columns saved at different sizes are padded to the largest.
        let num_docs = self.num_docs();
        for attribute in self.attributes.values_mut() {
            while attribute.num_docs() < num_docs {
                attribute.add_doc();
            }
            attribute.commit();
        }
        info!(attributes = self.attributes.len(), docs = num_docs, dir = %dir.display(), "attributes loaded");
        Ok(())
    }
}
