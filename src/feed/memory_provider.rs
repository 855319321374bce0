use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};
use crate::core::types::{DocId, Document, DocumentUpdate};
use crate::feed::attribute_writer::AttributeWriter;
use crate::feed::spi::{
    BucketId, Completion, GetResult, OperationContext, OperationResult, PersistenceProvider, Timestamp,
};

enum Operation {
    Put(Document),
    Update(DocumentUpdate),
    Remove(DocId),
}

struct Job {
    bucket: BucketId,
    timestamp: Timestamp,
    operation: Operation,
    completion: Completion,
}

type DocumentMap = HashMap<(BucketId, DocId), (Timestamp, Document)>;

/// Provider keeping documents in memory. Operations are applied in arrival order by one
/// background thread, which also feeds an optional attribute writer.
pub struct MemoryProvider {
    documents: Arc<RwLock<DocumentMap>>,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::spawn(None)
    }

    pub fn with_attributes(writer: Arc<Mutex<AttributeWriter>>) -> Self {
        Self::spawn(Some(writer))
    }

    fn spawn(writer: Option<Arc<Mutex<AttributeWriter>>>) -> Self {
        let documents = Arc::new(RwLock::new(HashMap::new()));
        let (sender, receiver) = unbounded();
        let worker = {
            let documents = Arc::clone(&documents);
            thread::Builder::new()
                .name("memory-provider".into())
                .spawn(move || Self::apply_worker(receiver, documents, writer))
                .ok()
        };
        if worker.is_none() {
            error!("failed to start memory provider worker");
        }
        MemoryProvider {
            documents,
            sender: worker.as_ref().map(|_| sender),
            worker,
        }
    }

    pub fn num_documents(&self) -> usize {
        self.documents.read().len()
    }

    fn apply_worker(
        receiver: Receiver<Job>,
        documents: Arc<RwLock<DocumentMap>>,
        writer: Option<Arc<Mutex<AttributeWriter>>>,
    ) {
        while let Ok(job) = receiver.recv() {
            let result = Self::apply(&documents, writer.as_deref(), job.bucket, job.timestamp, job.operation);
            // Commit once the queue runs dry so readers see a whole burst at a time.
            if receiver.is_empty() {
                if let Some(writer) = &writer {
                    writer.lock().commit();
                }
            }
            (job.completion)(result);
        }
        debug!("memory provider worker stopped");
    }

    fn apply(
        documents: &RwLock<DocumentMap>,
        writer: Option<&Mutex<AttributeWriter>>,
        bucket: BucketId,
        timestamp: Timestamp,
        operation: Operation,
    ) -> OperationResult {
        let mut documents = documents.write();
        let applied = match operation {
            Operation::Put(document) => {
                let key = (bucket, document.id);
                if matches!(documents.get(&key), Some((existing, _)) if *existing > timestamp) {
                    return OperationResult::ok();
                }
                let applied = writer.map_or(Ok(()), |w| w.lock().put(&document));
                documents.insert(key, (timestamp, document));
                applied
            }
            Operation::Update(update) => {
                let Some((stamp, document)) = documents.get_mut(&(bucket, update.id)) else {
                    return OperationResult::error(format!("no document {} to update", update.id.value()));
                };
                for (name, value) in &update.assignments {
                    document.fields.insert(name.clone(), value.clone());
                }
                for name in &update.clears {
                    document.fields.remove(name);
                }
                *stamp = timestamp;
                writer.map_or(Ok(()), |w| w.lock().update(&update))
            }
            Operation::Remove(id) => {
                documents.remove(&(bucket, id));
                writer.map_or(Ok(()), |w| w.lock().remove(id))
            }
        };
        match applied {
            Ok(()) => OperationResult::ok(),
            Err(e) => OperationResult::error(e.to_string()),
        }
    }

    fn submit(&self, bucket: BucketId, timestamp: Timestamp, operation: Operation, completion: Completion) {
        let job = Job {
            bucket,
            timestamp,
            operation,
            completion,
        };
        let Some(sender) = &self.sender else {
            (job.completion)(OperationResult::error("provider worker not running"));
            return;
        };
        if let Err(e) = sender.send(job) {
            (e.0.completion)(OperationResult::error("provider worker not running"));
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryProvider {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl PersistenceProvider for MemoryProvider {
    fn put_async(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        document: Document,
        _context: OperationContext,
        completion: Completion,
    ) {
        self.submit(bucket, timestamp, Operation::Put(document), completion);
    }

    fn update_async(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        update: DocumentUpdate,
        _context: OperationContext,
        completion: Completion,
    ) {
        self.submit(bucket, timestamp, Operation::Update(update), completion);
    }

    fn remove_async(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        id: DocId,
        _context: OperationContext,
        completion: Completion,
    ) {
        self.submit(bucket, timestamp, Operation::Remove(id), completion);
    }

    fn get(&self, bucket: BucketId, id: DocId, _context: OperationContext) -> GetResult {
        match self.documents.read().get(&(bucket, id)) {
            Some((timestamp, document)) => GetResult {
                result: OperationResult::ok(),
                timestamp: *timestamp,
                document: Some(document.clone()),
            },
            None => GetResult {
                result: OperationResult::ok(),
                timestamp: 0,
                document: None,
            },
        }
    }
}
