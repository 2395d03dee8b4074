//! In-memory round-robin counter.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::store::RoundRobinCounter;

/// Process-local counter, one atomic per key.
///
/// Resets on restart; the libSQL-backed counter survives restarts.
#[derive(Debug, Default)]
pub struct AtomicRoundRobin {
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
}

impl AtomicRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, key: &str) -> Arc<AtomicU64> {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.entry(key.to_string()).or_default().clone()
    }
}

#[async_trait]
impl RoundRobinCounter for AtomicRoundRobin {
    async fn next_slot(&self, key: &str, len: usize) -> Result<usize, DatabaseError> {
        if len == 0 {
            return Err(DatabaseError::Query(format!("next_slot: no slots for '{key}'")));
        }
        let n = self.counter(key).fetch_add(1, Ordering::Relaxed);
        Ok((n % len as u64) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cycles_through_slots() {
        let rr = AtomicRoundRobin::new();
        let mut slots = Vec::new();
        for _ in 0..7 {
            slots.push(rr.next_slot("topics", 3).await.unwrap());
        }
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let rr = AtomicRoundRobin::new();
        assert_eq!(rr.next_slot("a", 2).await.unwrap(), 0);
        assert_eq!(rr.next_slot("a", 2).await.unwrap(), 1);
        assert_eq!(rr.next_slot("b", 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_slot_list_is_an_error() {
        let rr = AtomicRoundRobin::new();
        assert!(rr.next_slot("a", 0).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_callers_spread_evenly() {
        let rr = Arc::new(AtomicRoundRobin::new());
        let mut handles = Vec::new();
        for _ in 0..30 {
            let rr = rr.clone();
            handles.push(tokio::spawn(async move { rr.next_slot("t", 3).await.unwrap() }));
        }
        let mut counts = [0usize; 3];
        for handle in handles {
            counts[handle.await.unwrap()] += 1;
        }
        assert_eq!(counts, [10, 10, 10]);
    }
}
