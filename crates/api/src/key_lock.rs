//! Per-idempotency-key serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Serializes concurrent requests bearing the same idempotency key.
///
/// The second request waits for the first to finish and then reads its
/// terminal outcome, instead of racing two saga runs for the same
/// logical reservation. Distinct keys never contend. A key's entry is
/// removed when its last guard drops, so the table only holds keys with
/// a request in flight.
#[derive(Clone, Default)]
pub struct KeyLocks {
    locks: LockTable,
}

impl KeyLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for a key, creating it on first use.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.clone().lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            lock,
            table: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Returns the number of keys with a request currently in flight.
    pub fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

/// Holds the lock for one key until dropped.
pub struct KeyGuard {
    key: String,
    lock: Arc<Mutex<()>>,
    table: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.table.lock().unwrap();
        // Two strong refs remain when nobody else uses this key: the
        // table's entry and this guard's clone. A waiter (queued on
        // lock_owned or about to be) holds a third and keeps the entry.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}
