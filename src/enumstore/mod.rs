pub mod value;
pub mod comparator;
pub mod enum_store;
pub mod batch_updater;
pub mod remapper;
pub mod enumerator;
pub mod read_guard;
pub mod loader;

pub use enum_store::{EnumEntry, EnumHandle, EnumStore, Index};
pub use batch_updater::BatchUpdater;
pub use loader::{EnumeratedLoader, EnumeratedPostingsLoader};
pub use read_guard::{EnumStoreReadGuard, EnumStoreReader};
pub use remapper::EnumIndexRemapper;
pub use value::EnumValue;
