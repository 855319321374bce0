use parking_lot::{Condvar, Mutex};

/// Bounds the number of operations in flight between a feeder and its provider.
pub struct PendingTracker {
    limit: usize,
    pending: Mutex<usize>,
    cond: Condvar,
}

impl PendingTracker {
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "pending limit must be positive");
        PendingTracker {
            limit,
            pending: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn pending(&self) -> usize {
        *self.pending.lock()
    }

    /// Block until fewer than `limit` operations are in flight, then count one more.
    pub fn retain(&self) {
        let mut pending = self.pending.lock();
        while *pending >= self.limit {
            self.cond.wait(&mut pending);
        }
        *pending += 1;
    }

    pub fn release(&self) {
        let mut pending = self.pending.lock();
        assert!(*pending > 0, "release without matching retain");
        *pending -= 1;
        self.cond.notify_all();
    }

    /// Block until every retained operation has been released.
    pub fn drain(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.cond.wait(&mut pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn retain_blocks_at_limit() {
        let tracker = Arc::new(PendingTracker::new(2));
        tracker.retain();
        tracker.retain();
        assert_eq!(tracker.pending(), 2);

        let entered = Arc::new(AtomicUsize::new(0));
        let handle = {
            let tracker = Arc::clone(&tracker);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                tracker.retain();
                entered.fetch_add(1, Ordering::SeqCst);
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(entered.load(Ordering::SeqCst), 0);

        tracker.release();
        handle.join().unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.pending(), 2);
    }

    #[test]
    fn drain_waits_for_all_releases() {
        let tracker = Arc::new(PendingTracker::new(8));
        for _ in 0..8 {
            tracker.retain();
        }
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5 * i));
                    tracker.release();
                })
            })
            .collect();
        tracker.drain();
        assert_eq!(tracker.pending(), 0);
        for w in workers {
            w.join().unwrap();
        }
    }
}
