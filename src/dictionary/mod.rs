pub mod comparator;
pub mod btree;
pub mod hash_table;
pub mod enum_store_dictionary;
pub mod btree_dictionary;
pub mod hash_dictionary;
pub mod hybrid_dictionary;
pub mod read_snapshot;

pub use comparator::EntryComparator;
pub use enum_store_dictionary::{AddResult, EnumStoreDictionary, make_dictionary};
pub use read_snapshot::{DictionaryReader, DictionarySnapshot};
