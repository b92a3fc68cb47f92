//! Sequence numbers shared by the scheduler handle and its worker.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source. Ids start at 1 so that 0 never names a live task or wait.
#[derive(Debug)]
pub struct SeqGenerator {
    next: AtomicU64,
}

impl SeqGenerator {
    /// Create a generator whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Mint the next id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SeqGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_ids_start_at_one() {
        let seq = SeqGenerator::new();
        assert_eq!(seq.next_id(), 1);
        assert_eq!(seq.next_id(), 2);
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let seq = Arc::new(SeqGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let seq = Arc::clone(&seq);
                thread::spawn(move || (0..100).map(|_| seq.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
    }
}
