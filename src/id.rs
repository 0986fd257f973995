//! Process-local monotonically increasing identifier generator.
//!
//! Used to mint the `<id>` suffix of container names and eval directory
//! names. No relation to wall-clock time or randomness is required or
//! provided; uniqueness within the process lifetime is the only contract.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub const fn new() -> Self {
        IdGenerator {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a fresh id, strictly greater than every id returned before it.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase() {
        let gen = IdGenerator::new();
        let mut last = gen.next();
        for _ in 0..1000 {
            let next = gen.next();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn concurrent_generation_never_yields_duplicates() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let gen = Arc::new(IdGenerator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let gen = gen.clone();
            handles.push(std::thread::spawn(move || {
                (0..200).map(|_| gen.next()).collect::<Vec<_>>()
            }));
        }

        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id), "duplicate id minted: {id}");
            }
        }
    }
}
