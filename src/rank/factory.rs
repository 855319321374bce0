use std::collections::BTreeMap;
use tracing::warn;
use crate::rank::blueprint::Blueprint;

/// Registry of blueprint prototypes by base name.
#[derive(Default)]
pub struct BlueprintFactory {
    prototypes: BTreeMap<String, Box<dyn Blueprint>>,
}

impl BlueprintFactory {
    pub fn new() -> Self {
        BlueprintFactory::default()
    }

    /// Register a prototype. A second prototype for the same base name is ignored.
    pub fn add_prototype(&mut self, prototype: Box<dyn Blueprint>) {
        let name = prototype.base_name().to_string();
        if self.prototypes.contains_key(&name) {
            warn!(base_name = %name, "blueprint base name already registered");
            return;
        }
        self.prototypes.insert(name, prototype);
    }

    pub fn create_blueprint(&self, base_name: &str) -> Option<Box<dyn Blueprint>> {
        self.prototypes.get(base_name).map(|p| p.create_instance())
    }

    pub fn base_names(&self) -> impl Iterator<Item = &str> {
        self.prototypes.keys().map(String::as_str)
    }
}
