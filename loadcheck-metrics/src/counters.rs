//! Named outcome counters

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe map from counter name to a monotonically increasing value.
///
/// Existing keys are bumped under the read lock; the write lock is taken
/// only the first time a key is seen.
#[derive(Debug, Default)]
pub struct Counters {
    values: RwLock<HashMap<String, AtomicU64>>,
}

impl Counters {
    /// Create an empty counter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `key` by one, creating it at zero if absent
    pub fn increment(&self, key: &str) {
        self.add(key, 1);
    }

    /// Increment `key` by `amount`, creating it at zero if absent
    pub fn add(&self, key: &str, amount: u64) {
        {
            let values = self.values.read();
            if let Some(counter) = values.get(key) {
                counter.fetch_add(amount, Ordering::Relaxed);
                return;
            }
        }

        let mut values = self.values.write();
        values
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    /// Current value of `key`, zero if it was never incremented
    pub fn get(&self, key: &str) -> u64 {
        self.values
            .read()
            .get(key)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Copy of every counter.
    ///
    /// Taken under the write lock so no increment lands halfway through.
    pub fn snapshot(&self) -> CounterSnapshot {
        let values = self.values.write();
        CounterSnapshot(
            values
                .iter()
                .map(|(key, counter)| (key.clone(), counter.load(Ordering::Relaxed)))
                .collect(),
        )
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

/// Shared counter set
pub type SharedCounters = Arc<Counters>;

/// Point-in-time copy of a [`Counters`] set, ordered by key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterSnapshot(BTreeMap<String, u64>);

impl CounterSnapshot {
    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Sum of every counter
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Sum of the counters whose key satisfies `predicate`
    pub fn sum_matching(&self, predicate: impl Fn(&str) -> bool) -> u64 {
        self.iter()
            .filter(|(key, _)| predicate(key))
            .map(|(_, value)| value)
            .sum()
    }

    pub fn into_inner(self) -> BTreeMap<String, u64> {
        self.0
    }
}
