pub mod pending_tracker;
pub mod sequence;
pub mod spi;
pub mod attribute_writer;
pub mod memory_provider;

pub use attribute_writer::AttributeWriter;
pub use memory_provider::MemoryProvider;
pub use pending_tracker::PendingTracker;
pub use sequence::SequenceGenerator;
pub use spi::{
    BucketId, Completion, FeedReport, Feeder, GetResult, OperationContext, OperationResult, PersistenceProvider,
    Timestamp,
};
