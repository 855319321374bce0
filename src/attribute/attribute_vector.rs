use std::path::Path;
use std::sync::Arc;
use crate::attribute::enum_attribute::EnumAttribute;
use crate::attribute::read_guard::AttributeReader;
use crate::core::config::{AttributeConfig, BasicType, CollectionType};
use crate::core::error::{Error, Result};
use crate::core::generation::GenerationHandler;
use crate::core::stats::AttributeStats;
use crate::core::types::FieldValue;
use crate::enumstore::value::EnumValue;

/// Writer side of an attribute with the value type erased, so the feed layer can hold
/// columns of different types in one map.
pub trait AttributeVector: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> &AttributeConfig;

    fn num_docs(&self) -> u32;

    fn add_doc(&mut self) -> u32;

    /// Queue `value` as the document's new content. Fails with `InvalidInput` when the
    /// value does not fit the attribute's type or collection.
    fn update_field(&mut self, doc_id: u32, value: &FieldValue) -> Result<()>;

    fn clear_doc(&mut self, doc_id: u32) -> Result<()>;

    fn commit(&mut self);

    fn stats(&self) -> &AttributeStats;

    fn save(&self, dir: &Path) -> Result<()>;

    fn load(&mut self, dir: &Path) -> Result<()>;

    fn make_reader(&self) -> Arc<dyn AttributeReader>;
}

fn convert<T: EnumValue>(name: &str, value: &FieldValue) -> Result<T> {
    T::from_field(value).ok_or_else(|| {
        Error::invalid_input(format!(
            "attribute '{}' ({:?}) cannot hold {:?}",
            name,
            T::BASIC_TYPE,
            value
        ))
    })
}

/// Field value to `(value, weight)` pairs for the attribute's collection type.
fn field_values<T: EnumValue>(name: &str, collection: CollectionType, value: &FieldValue) -> Result<Vec<(T, i32)>> {
    match (collection, value) {
        (CollectionType::Single, FieldValue::Array(_) | FieldValue::WeightedSet(_)) => Err(Error::invalid_input(
            format!("single-value attribute '{}' given a collection", name),
        )),
        (CollectionType::Single, v) => Ok(vec![(convert(name, v)?, 1)]),
        (CollectionType::Array, FieldValue::Array(items)) => {
            items.iter().map(|v| Ok((convert(name, v)?, 1))).collect()
        }
        (CollectionType::WeightedSet, FieldValue::WeightedSet(items)) => {
            items.iter().map(|(v, w)| Ok((convert(name, v)?, *w))).collect()
        }
        (collection, v) => Err(Error::invalid_input(format!(
            "attribute '{}' is {:?}, got {:?}",
            name, collection, v
        ))),
    }
}

impl<T: EnumValue> AttributeVector for EnumAttribute<T> {
    fn name(&self) -> &str {
        EnumAttribute::name(self)
    }

    fn config(&self) -> &AttributeConfig {
        EnumAttribute::config(self)
    }

    fn num_docs(&self) -> u32 {
        EnumAttribute::num_docs(self)
    }

    fn add_doc(&mut self) -> u32 {
        EnumAttribute::add_doc(self)
    }

    fn update_field(&mut self, doc_id: u32, value: &FieldValue) -> Result<()> {
        let values = field_values(&self.name, self.config.collection, value)?;
        self.set_values(doc_id, values)
    }

    fn clear_doc(&mut self, doc_id: u32) -> Result<()> {
        EnumAttribute::clear_doc(self, doc_id)
    }

    fn commit(&mut self) {
        EnumAttribute::commit(self)
    }

    fn stats(&self) -> &AttributeStats {
        EnumAttribute::stats(self)
    }

    fn save(&self, dir: &Path) -> Result<()> {
        EnumAttribute::save(self, dir)
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        EnumAttribute::load(self, dir)
    }

    fn make_reader(&self) -> Arc<dyn AttributeReader> {
        Arc::new(self.reader())
    }
}

/// Build the attribute column matching `config.basic_type`.
pub fn create_attribute(
    name: &str,
    config: AttributeConfig,
    generations: Arc<GenerationHandler>,
) -> Box<dyn AttributeVector> {
    match config.basic_type {
        BasicType::Int8 => Box::new(EnumAttribute::<i8>::with_generations(name, config, generations)),
        BasicType::Int16 => Box::new(EnumAttribute::<i16>::with_generations(name, config, generations)),
        BasicType::Int32 => Box::new(EnumAttribute::<i32>::with_generations(name, config, generations)),
        BasicType::Int64 => Box::new(EnumAttribute::<i64>::with_generations(name, config, generations)),
        BasicType::Float => Box::new(EnumAttribute::<f32>::with_generations(name, config, generations)),
        BasicType::Double => Box::new(EnumAttribute::<f64>::with_generations(name, config, generations)),
        BasicType::String => Box::new(EnumAttribute::<String>::with_generations(name, config, generations)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn factory_builds_typed_columns() {
        let generations = Arc::new(GenerationHandler::new());
        let mut attr = create_attribute(
            "year",
            AttributeConfig::new(BasicType::Int16, CollectionType::Single),
            Arc::clone(&generations),
        );
        let doc = attr.add_doc();
        attr.update_field(doc, &FieldValue::Integer(1999)).unwrap();
        let err = attr.update_field(doc, &FieldValue::Integer(100_000)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        attr.commit();

        let view = attr.make_reader().make_read_view();
        assert_eq!(view.get_number(doc), 1999.0);
        assert_eq!(attr.stats().num_docs, 1);
    }

    #[test]
    fn collection_shape_must_match() {
        let generations = Arc::new(GenerationHandler::new());
        let mut tags = create_attribute(
            "tags",
            AttributeConfig::new(BasicType::String, CollectionType::WeightedSet),
            generations,
        );
        let doc = tags.add_doc();
        let err = tags.update_field(doc, &FieldValue::Text("x".into())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        tags.update_field(
            doc,
            &FieldValue::WeightedSet(vec![(FieldValue::Text("a".into()), 2), (FieldValue::Text("b".into()), 4)]),
        )
        .unwrap();
        tags.commit();
        let fields = tags.make_reader().make_read_view().get_fields(doc);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1], (FieldValue::Text("b".into()), 4));
    }
}
