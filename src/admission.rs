//! Admission Gate (C7): a process-wide map from container name to a bounded
//! semaphore, limiting concurrent evaluations per container.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Default)]
pub struct AdmissionGate {
    slots: DashMap<String, Arc<Semaphore>>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        AdmissionGate {
            slots: DashMap::new(),
        }
    }

    /// Acquire a slot for `container`, creating its semaphore (capacity
    /// `concurrent`) on first reference. The entry survives the destruction
    /// of the container it guards; a future container with the same name
    /// prefix but a fresh id just gets its own fresh entry.
    pub async fn acquire(&self, container: &str, concurrent: usize) -> OwnedSemaphorePermit {
        let semaphore = self
            .slots
            .entry(container.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(concurrent.max(1))))
            .clone();

        // The semaphore is never closed, so acquiring it can't fail.
        semaphore
            .acquire_owned()
            .await
            .expect("admission semaphore is never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_configured_capacity() {
        let gate = Arc::new(AdmissionGate::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let gate = gate.clone();
            let in_flight = in_flight.clone();
            let max_observed = max_observed.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire("myriag_echo_1", 2).await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn distinct_containers_get_independent_slots() {
        let gate = AdmissionGate::new();
        let _a = gate.acquire("myriag_echo_1", 1).await;
        // A second container must not block on the first one's single slot.
        let fut = gate.acquire("myriag_echo_2", 1);
        let result = tokio::time::timeout(Duration::from_millis(50), fut).await;
        assert!(result.is_ok());
    }
}
