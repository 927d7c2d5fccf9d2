// src/infrastructure/lock.rs
// In-process advisory lock table with TTL-based auto-release

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::domain::repository::EvaluationLockRepository;

/// Lock entries expire on their own; `release` just removes them early.
/// Process-local by design, the batch path only needs to keep overlapping
/// runs in the same process off one account.
pub struct EvaluationLockTable {
    entries: Mutex<HashMap<String, Instant>>,
}

impl EvaluationLockTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for EvaluationLockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationLockRepository for EvaluationLockTable {
    fn try_acquire(&self, key: &str, ttl: Duration) -> bool {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        if let Some(expiry) = entries.get(key) {
            if *expiry > now {
                return false;
            }
        }

        entries.insert(key.to_string(), now + ttl);
        true
    }

    fn is_held(&self, key: &str) -> bool {
        let entries = self.entries.lock();
        entries
            .get(key)
            .map(|expiry| *expiry > Instant::now())
            .unwrap_or(false)
    }

    fn release(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}
