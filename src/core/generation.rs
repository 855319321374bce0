use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use parking_lot::Mutex;
use crate::datastore::atomic_arc::AtomicArc;

pub type Generation = u64;

/// Reader count for one generation. Goes negative once retired with no readers left.
struct GenerationHold {
    generation: Generation,
    refs: AtomicI64,
}

const INVALID_REFS: i64 = i64::MIN / 2;

impl GenerationHold {
    fn new(generation: Generation) -> Self {
        GenerationHold {
            generation,
            refs: AtomicI64::new(0),
        }
    }

    fn acquire(&self) -> bool {
        let prev = self.refs.fetch_add(1, Ordering::AcqRel);
        if prev < 0 {
            self.refs.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    fn release(&self) {
        self.refs.fetch_sub(1, Ordering::AcqRel);
    }

    fn try_invalidate(&self) -> bool {
        self.refs
            .compare_exchange(0, INVALID_REFS, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn readers(&self) -> u64 {
        self.refs.load(Ordering::Acquire).max(0) as u64
    }
}

/// Tracks which generations are still visible to readers.
///
/// Readers call [`take_guard`](Self::take_guard) without locking. The single writer
/// bumps the generation after publishing changes and asks for
/// [`oldest_used_generation`](Self::oldest_used_generation) before reusing memory.
pub struct GenerationHandler {
    current: AtomicArc<GenerationHold>,
    current_generation: AtomicU64,
    oldest_used: AtomicU64,
    retired: Mutex<VecDeque<Arc<GenerationHold>>>,
}

impl GenerationHandler {
    pub fn new() -> Self {
        GenerationHandler {
            current: AtomicArc::new(Arc::new(GenerationHold::new(0))),
            current_generation: AtomicU64::new(0),
            oldest_used: AtomicU64::new(0),
            retired: Mutex::new(VecDeque::new()),
        }
    }

    pub fn take_guard(&self) -> GenerationGuard {
        loop {
            let hold = self.current.load();
            if hold.acquire() {
                return GenerationGuard { hold };
            }
        }
    }

    pub fn current_generation(&self) -> Generation {
        self.current_generation.load(Ordering::Acquire)
    }

    pub fn oldest_used_generation(&self) -> Generation {
        self.oldest_used.load(Ordering::Acquire)
    }

    /// Writer only: publish a new generation and retire the previous one.
    pub fn inc_generation(&self) {
        let next = self.current_generation() + 1;
        let previous = self.current.swap(Arc::new(GenerationHold::new(next)));
        self.current_generation.store(next, Ordering::Release);
        self.retired.lock().push_back(previous);
        self.update_oldest_used_generation();
    }

    pub fn update_oldest_used_generation(&self) {
        let mut retired = self.retired.lock();
        while let Some(front) = retired.front() {
            if !front.try_invalidate() {
                break;
            }
            retired.pop_front();
        }
        let oldest = retired
            .front()
            .map(|hold| hold.generation)
            .unwrap_or_else(|| self.current_generation());
        self.oldest_used.store(oldest, Ordering::Release);
    }

    /// Readers holding a guard on `generation`. Only meaningful for tests and stats.
    pub fn readers_at(&self, generation: Generation) -> u64 {
        if generation == self.current_generation() {
            return self.current.load().readers();
        }
        self.retired
            .lock()
            .iter()
            .find(|hold| hold.generation == generation)
            .map(|hold| hold.readers())
            .unwrap_or(0)
    }
}

impl Default for GenerationHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps its generation's memory alive until dropped.
pub struct GenerationGuard {
    hold: Arc<GenerationHold>,
}

impl GenerationGuard {
    pub fn generation(&self) -> Generation {
        self.hold.generation
    }
}

impl Clone for GenerationGuard {
    fn clone(&self) -> Self {
        // A live guard keeps the count positive, so the hold cannot be invalidated here.
        self.hold.refs.fetch_add(1, Ordering::AcqRel);
        GenerationGuard { hold: Arc::clone(&self.hold) }
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.hold.release();
    }
}

impl std::fmt::Debug for GenerationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationGuard")
            .field("generation", &self.hold.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_used_follows_released_guards() {
        let handler = GenerationHandler::new();
        let guard0 = handler.take_guard();
        assert_eq!(guard0.generation(), 0);

        handler.inc_generation();
        handler.inc_generation();
        assert_eq!(handler.current_generation(), 2);
        assert_eq!(handler.oldest_used_generation(), 0);

        drop(guard0);
        handler.update_oldest_used_generation();
        assert_eq!(handler.oldest_used_generation(), 2);
    }

    #[test]
    fn guard_taken_after_increment_sees_new_generation() {
        let handler = GenerationHandler::new();
        handler.inc_generation();
        let guard = handler.take_guard();
        assert_eq!(guard.generation(), 1);
        assert_eq!(handler.readers_at(1), 1);
        let copy = guard.clone();
        assert_eq!(handler.readers_at(1), 2);
        drop(guard);
        drop(copy);
        assert_eq!(handler.readers_at(1), 0);
    }

    #[test]
    fn middle_guard_blocks_later_generations() {
        let handler = GenerationHandler::new();
        handler.inc_generation();
        let guard1 = handler.take_guard();
        handler.inc_generation();
        handler.inc_generation();
        assert_eq!(handler.oldest_used_generation(), 1);
        drop(guard1);
        handler.update_oldest_used_generation();
        assert_eq!(handler.oldest_used_generation(), 3);
    }
}
