use std::sync::Arc;
use std::sync::atomic::Ordering;
use crossbeam::epoch::{self, Atomic, Owned};

/// An `Arc<T>` slot that readers load without locking while one writer swaps it.
///
/// The boxed `Arc` is only destroyed after every thread pinned at swap time has unpinned.
pub struct AtomicArc<T> {
    inner: Atomic<Arc<T>>,
}

impl<T> AtomicArc<T> {
    pub fn new(value: Arc<T>) -> Self {
        AtomicArc {
            inner: Atomic::new(value),
        }
    }

    pub fn load(&self) -> Arc<T> {
        let guard = epoch::pin();
        let shared = self.inner.load(Ordering::Acquire, &guard);
        // SAFETY: the slot is never null, and a swapped-out box is destroyed only
        // after this pin is released.
        unsafe { shared.deref() }.clone()
    }

    pub fn store(&self, value: Arc<T>) {
        drop(self.swap(value));
    }

    pub fn swap(&self, value: Arc<T>) -> Arc<T> {
        let guard = epoch::pin();
        let old = self.inner.swap(Owned::new(value), Ordering::AcqRel, &guard);
        // SAFETY: `old` was installed by `new` or a previous swap and is unlinked now.
        unsafe {
            let previous = old.deref().clone();
            guard.defer_destroy(old);
            previous
        }
    }
}

impl<T> Drop for AtomicArc<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out concurrent loads.
        unsafe {
            let shared = self.inner.load(Ordering::Relaxed, epoch::unprotected());
            if !shared.is_null() {
                drop(shared.into_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_returns_previous_value() {
        let slot = AtomicArc::new(Arc::new(1u32));
        let reader_copy = slot.load();
        let old = slot.swap(Arc::new(2));
        assert_eq!(*old, 1);
        assert_eq!(*reader_copy, 1);
        assert_eq!(*slot.load(), 2);
    }
}
