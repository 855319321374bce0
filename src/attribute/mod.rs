pub mod file_format;
pub mod posting_store;
pub mod single_value;
pub mod multi_value;
pub mod enum_attribute;
pub mod read_guard;
pub mod enumerated_io;
pub mod attribute_vector;

pub use attribute_vector::{create_attribute, AttributeVector};
pub use enum_attribute::EnumAttribute;
pub use multi_value::WeightedIndex;
pub use posting_store::{Posting, PostingList};
pub use read_guard::{AttributeReadView, AttributeReader, EnumAttributeReadGuard, EnumAttributeReader};
