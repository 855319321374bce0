use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out increasing ids for feed operations. Each feeder owns its own generator.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        SequenceGenerator::default()
    }

    pub fn starting_at(first: u64) -> Self {
        SequenceGenerator {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The id the next call to `next_id` returns.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ids_are_unique_across_threads() {
        let generator = Arc::new(SequenceGenerator::starting_at(10));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || (0..250).map(|_| generator.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
        assert_eq!(*seen.iter().min().unwrap(), 10);
        assert_eq!(generator.peek(), 1010);
    }
}
