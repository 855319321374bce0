use std::collections::HashMap;
use crate::datastore::entry_ref::EntryRef;
use crate::dictionary::enum_store_dictionary::EnumStoreDictionary;

/// Maps each stored index to its 1-based position in dictionary order.
///
/// Saved files store `enum - 1`, so the first value in the unique-values blob is 0.
pub struct Enumerator {
    enums: HashMap<EntryRef, u32>,
}

impl Enumerator {
    pub fn new(dict: &dyn EnumStoreDictionary) -> Self {
        let mut enums = HashMap::with_capacity(dict.num_uniques());
        let mut next = 1u32;
        dict.for_each_entry(&mut |idx, _| {
            enums.insert(idx, next);
            next += 1;
        });
        Enumerator { enums }
    }

    pub fn len(&self) -> usize {
        self.enums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enums.is_empty()
    }

    pub fn map_entry_ref_to_enum_value(&self, idx: EntryRef) -> u32 {
        *self
            .enums
            .get(&idx)
            .unwrap_or_else(|| panic!("enum {:?} is not in the enumeration", idx))
    }

    /// The value written to `.dat` files.
    pub fn saved_enum(&self, idx: EntryRef) -> u32 {
        self.map_entry_ref_to_enum_value(idx) - 1
    }
}

#[cfg(test)]
mod tests {
    use crate::core::config::{DictionaryConfig, GrowStrategy};
    use crate::enumstore::enum_store::EnumStore;

    #[test]
    fn enumeration_is_one_based_in_value_order() {
        let mut store: EnumStore<i16> = EnumStore::new(DictionaryConfig::default(), GrowStrategy::default());
        let c = store.insert(&30);
        let a = store.insert(&-5);
        let b = store.insert(&7);
        let enumerator = store.make_enumerator();
        assert_eq!(enumerator.len(), 3);
        assert_eq!(enumerator.map_entry_ref_to_enum_value(a), 1);
        assert_eq!(enumerator.map_entry_ref_to_enum_value(b), 2);
        assert_eq!(enumerator.saved_enum(c), 2);
    }
}
