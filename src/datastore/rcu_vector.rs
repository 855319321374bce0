use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use crate::datastore::atomic_arc::AtomicArc;

type Words = Box<[AtomicU32]>;

struct RcuShared {
    data: AtomicArc<Words>,
    len: AtomicUsize,
}

/// Growable vector of 32-bit words with lock-free readers.
///
/// Writes go to the current backing array with atomic stores. Growing copies into a
/// larger array and publishes it; views taken earlier keep the old array alive.
pub struct RcuVector {
    shared: Arc<RcuShared>,
    data: Arc<Words>,
    len: usize,
}

fn allocate(capacity: usize) -> Arc<Words> {
    Arc::new((0..capacity).map(|_| AtomicU32::new(0)).collect())
}

impl RcuVector {
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let data = allocate(capacity.max(1));
        RcuVector {
            shared: Arc::new(RcuShared {
                data: AtomicArc::new(Arc::clone(&data)),
                len: AtomicUsize::new(0),
            }),
            data,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> u32 {
        assert!(index < self.len, "index {} out of bounds ({})", index, self.len);
        self.data[index].load(Ordering::Relaxed)
    }

    pub fn set(&mut self, index: usize, value: u32) {
        assert!(index < self.len, "index {} out of bounds ({})", index, self.len);
        self.data[index].store(value, Ordering::Release);
    }

    pub fn push(&mut self, value: u32) {
        self.ensure_capacity(self.len + 1);
        self.data[self.len].store(value, Ordering::Release);
        self.len += 1;
        self.shared.len.store(self.len, Ordering::Release);
    }

    pub fn resize(&mut self, len: usize, fill: u32) {
        self.ensure_capacity(len);
        for slot in self.data[self.len.min(len)..len].iter() {
            slot.store(fill, Ordering::Release);
        }
        self.len = len;
        self.shared.len.store(len, Ordering::Release);
    }

    fn ensure_capacity(&mut self, wanted: usize) {
        if wanted <= self.data.len() {
            return;
        }
        let capacity = wanted.max(self.data.len() * 2);
        let grown = allocate(capacity);
        for (dst, src) in grown.iter().zip(self.data[..self.len].iter()) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        self.shared.data.store(Arc::clone(&grown));
        self.data = grown;
    }

    pub fn view(&self) -> RcuView {
        view_of(&self.shared)
    }

    pub fn reader(&self) -> RcuReader {
        RcuReader {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<AtomicU32>()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.data[..self.len].iter().map(|word| word.load(Ordering::Relaxed))
    }
}

impl Default for RcuVector {
    fn default() -> Self {
        Self::new()
    }
}

fn view_of(shared: &RcuShared) -> RcuView {
    // Length first: any array published before it is at least this long.
    let len = shared.len.load(Ordering::Acquire);
    let data = shared.data.load();
    RcuView { data, len }
}

/// Handle that can produce fresh views from another thread.
#[derive(Clone)]
pub struct RcuReader {
    shared: Arc<RcuShared>,
}

impl RcuReader {
    pub fn view(&self) -> RcuView {
        view_of(&self.shared)
    }
}

/// Consistent-length view of the vector at the time it was taken.
#[derive(Clone)]
pub struct RcuView {
    data: Arc<Words>,
    len: usize,
}

impl RcuView {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        if index >= self.len {
            return None;
        }
        Some(self.data[index].load(Ordering::Acquire))
    }
}
