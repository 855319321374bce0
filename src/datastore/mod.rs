pub mod entry_ref;
pub mod atomic_arc;
pub mod hold_list;
pub mod compaction;
pub mod data_store;
pub mod array_store;
pub mod rcu_vector;

pub use entry_ref::EntryRef;
