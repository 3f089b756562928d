//! Per-object-key mutual exclusion.
//!
//! Every object key gets its own async mutex, created on first use. Holding an
//! [`ObjectGuard`] is what it means to own the key's exclusive execution slot.
//! Slots are reclaimed once the last guard is dropped and nobody is waiting,
//! including when a waiter gives up or is cancelled, so the table only ever
//! holds keys that are busy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::EndpointError;

type Slot = Arc<AsyncMutex<()>>;

/// Table of per-key execution slots.
#[derive(Debug, Default)]
pub struct KeyedLockTable {
    slots: Mutex<HashMap<String, Slot>>,
}

impl KeyedLockTable {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the exclusive slot for `object_key`, waiting as long as it takes.
    pub async fn acquire(self: &Arc<Self>, object_key: &str) -> ObjectGuard {
        let guard = self.lock_slot(object_key).await;
        ObjectGuard::new(Arc::clone(self), object_key, guard)
    }

    /// Acquires the exclusive slot, giving up after `timeout`.
    ///
    /// With `timeout == None` this waits indefinitely, like [`acquire`](Self::acquire).
    pub async fn acquire_timeout(
        self: &Arc<Self>,
        object_key: &str,
        timeout: Option<Duration>,
    ) -> Result<ObjectGuard, EndpointError> {
        let Some(timeout) = timeout else {
            return Ok(self.acquire(object_key).await);
        };

        let acquired = tokio::time::timeout(timeout, self.lock_slot(object_key)).await;
        match acquired {
            Ok(guard) => Ok(ObjectGuard::new(Arc::clone(self), object_key, guard)),
            Err(_) => Err(EndpointError::LockTimeout {
                object_key: object_key.to_string(),
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Returns true if some invocation currently holds the slot for `object_key`.
    pub fn is_locked(&self, object_key: &str) -> bool {
        self.slots()
            .get(object_key)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of keys with a live slot.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    /// Returns true if no key has a live slot.
    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, object_key: &str) -> Slot {
        Arc::clone(self.slots().entry(object_key.to_string()).or_default())
    }

    /// Waits for the key's mutex. If this future is dropped before it wins,
    /// the wait is dropped first and then the slot is reclaimed.
    async fn lock_slot(&self, object_key: &str) -> OwnedMutexGuard<()> {
        let mut abandoned = AbandonedWait {
            table: self,
            object_key,
            armed: true,
        };
        let guard = self.slot(object_key).lock_owned().await;
        abandoned.armed = false;
        guard
    }

    /// Drops the slot for `object_key` if only the table still references it.
    fn reclaim(&self, object_key: &str) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get(object_key) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(object_key);
            }
        }
    }
}

struct AbandonedWait<'a> {
    table: &'a KeyedLockTable,
    object_key: &'a str,
    armed: bool,
}

impl Drop for AbandonedWait<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.table.reclaim(self.object_key);
        }
    }
}

/// Proof of exclusive access to one object key.
///
/// The slot is released when the guard is dropped, on every exit path.
#[derive(Debug)]
pub struct ObjectGuard {
    table: Arc<KeyedLockTable>,
    object_key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ObjectGuard {
    fn new(table: Arc<KeyedLockTable>, object_key: &str, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            table,
            object_key: object_key.to_string(),
            guard: Some(guard),
        }
    }

    /// The object key this guard owns.
    pub fn object_key(&self) -> &str {
        &self.object_key
    }
}

impl Drop for ObjectGuard {
    fn drop(&mut self) {
        // Release first so the strong count reflects only waiters and the table.
        drop(self.guard.take());
        self.table.reclaim(&self.object_key);
    }
}
