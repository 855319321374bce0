use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};
use crate::core::config::Config;
use crate::core::types::{DocId, Document, DocumentUpdate};
use crate::feed::pending_tracker::PendingTracker;
use crate::feed::sequence::SequenceGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketId(pub u64);

pub type Timestamp = u64;

/// Per-operation information passed along to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationContext {
    pub sequence_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationResult {
    error: Option<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        OperationResult { error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        OperationResult {
            error: Some(message.into()),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct GetResult {
    pub result: OperationResult,
    pub timestamp: Timestamp,
    pub document: Option<Document>,
}

/// Invoked exactly once when an asynchronous operation finishes.
pub type Completion = Box<dyn FnOnce(OperationResult) + Send>;

/// Storage backend the feeder writes through. Asynchronous operations may complete on
/// any thread.
pub trait PersistenceProvider: Send + Sync {
    fn put_async(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        document: Document,
        context: OperationContext,
        completion: Completion,
    );

    fn update_async(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        update: DocumentUpdate,
        context: OperationContext,
        completion: Completion,
    );

    fn remove_async(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        id: DocId,
        context: OperationContext,
        completion: Completion,
    );

    fn get(&self, bucket: BucketId, id: DocId, context: OperationContext) -> GetResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedReport {
    pub operations: u64,
    pub errors: u64,
}

/// Pushes operations into a provider with bounded concurrency and counts failures.
pub struct Feeder {
    provider: Arc<dyn PersistenceProvider>,
    tracker: Arc<PendingTracker>,
    sequence: SequenceGenerator,
    errors: Arc<AtomicU64>,
    operations: u64,
}

impl Feeder {
    pub fn new(provider: Arc<dyn PersistenceProvider>, max_pending: usize) -> Self {
        Feeder {
            provider,
            tracker: Arc::new(PendingTracker::new(max_pending)),
            sequence: SequenceGenerator::new(),
            errors: Arc::new(AtomicU64::new(0)),
            operations: 0,
        }
    }

    pub fn from_config(provider: Arc<dyn PersistenceProvider>, config: &Config) -> Self {
        Self::new(provider, config.max_pending_operations)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.tracker.pending()
    }

    fn begin(&mut self) -> (OperationContext, Timestamp, Completion) {
        self.tracker.retain();
        self.operations += 1;
        let sequence_id = self.sequence.next_id();
        let tracker = Arc::clone(&self.tracker);
        let errors = Arc::clone(&self.errors);
        let completion: Completion = Box::new(move |result: OperationResult| {
            if let Some(message) = result.message() {
                errors.fetch_add(1, Ordering::SeqCst);
                warn!(sequence_id, error = message, "feed operation failed");
            }
            tracker.release();
        });
        // Sequence ids are strictly increasing, so they double as timestamps.
        (OperationContext { sequence_id }, sequence_id + 1, completion)
    }

    pub fn put(&mut self, bucket: BucketId, document: Document) {
        let (context, timestamp, completion) = self.begin();
        self.provider.put_async(bucket, timestamp, document, context, completion);
    }

    pub fn update(&mut self, bucket: BucketId, update: DocumentUpdate) {
        let (context, timestamp, completion) = self.begin();
        self.provider.update_async(bucket, timestamp, update, context, completion);
    }

    pub fn remove(&mut self, bucket: BucketId, id: DocId) {
        let (context, timestamp, completion) = self.begin();
        self.provider.remove_async(bucket, timestamp, id, context, completion);
    }

    pub fn get(&self, bucket: BucketId, id: DocId) -> GetResult {
        let context = OperationContext {
            sequence_id: self.sequence.next_id(),
        };
        self.provider.get(bucket, id, context)
    }

    /// Wait for every outstanding operation and report the totals.
    pub fn finish(&mut self) -> FeedReport {
        self.tracker.drain();
        let report = FeedReport {
            operations: self.operations,
            errors: self.errors(),
        };
        info!(operations = report.operations, errors = report.errors, "feed finished");
        report
    }
}
