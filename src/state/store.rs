//! The keyed state store contract and its in-memory backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::EndpointError;

/// One staged mutation of a state entry.
///
/// `value == None` removes the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateWrite {
    /// The state name being written
    pub state_name: String,
    /// The new value, or `None` for a removal
    pub value: Option<Bytes>,
}

impl StateWrite {
    /// Creates a write that sets `state_name` to `value`.
    pub fn set(state_name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            state_name: state_name.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a write that removes `state_name`.
    pub fn clear(state_name: impl Into<String>) -> Self {
        Self {
            state_name: state_name.into(),
            value: None,
        }
    }

    /// Returns true if this write removes the entry.
    pub fn is_clear(&self) -> bool {
        self.value.is_none()
    }
}

/// Applies an ordered sequence of writes to one object's state map.
///
/// Later writes to the same name win.
pub(crate) fn apply_writes(state: &mut HashMap<String, Bytes>, writes: Vec<StateWrite>) {
    for write in writes {
        match write.value {
            Some(value) => {
                state.insert(write.state_name, value);
            }
            None => {
                state.remove(&write.state_name);
            }
        }
    }
}

/// Durable mapping from (object key, state name) to serialized bytes.
///
/// Reads only ever observe committed values. The only write path is
/// [`commit`](KeyedStateStore::commit), which the invocation router calls
/// while holding the object's exclusive execution slot.
#[async_trait]
pub trait KeyedStateStore: Send + Sync {
    /// Returns the committed value of a state entry, or `None` if unset.
    async fn get(&self, object_key: &str, state_name: &str)
        -> Result<Option<Bytes>, EndpointError>;

    /// Returns every committed entry of one object.
    async fn snapshot(&self, object_key: &str) -> Result<HashMap<String, Bytes>, EndpointError>;

    /// Atomically applies an ordered sequence of writes to one object.
    ///
    /// Either every write becomes visible or none does. Fails with
    /// [`EndpointError::StoreUnavailable`] when the backend cannot be reached.
    async fn commit(&self, object_key: &str, writes: Vec<StateWrite>)
        -> Result<(), EndpointError>;
}

/// Type alias for a shared state store.
pub type SharedStateStore = Arc<dyn KeyedStateStore>;

/// In-memory state store.
///
/// State lives for the lifetime of the process. The store can be switched
/// into an unavailable mode in which every call fails with
/// [`EndpointError::StoreUnavailable`], which is how outages are simulated.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    objects: RwLock<HashMap<String, HashMap<String, Bytes>>>,
    unavailable: AtomicBool,
    commits: AtomicU64,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store wrapped for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Marks the backend as reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of objects that have committed state.
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    fn check_available(&self) -> Result<(), EndpointError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(EndpointError::store_unavailable("in-memory store is marked unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyedStateStore for InMemoryStateStore {
    async fn get(
        &self,
        object_key: &str,
        state_name: &str,
    ) -> Result<Option<Bytes>, EndpointError> {
        self.check_available()?;
        let objects = self.objects.read().await;
        Ok(objects
            .get(object_key)
            .and_then(|state| state.get(state_name))
            .cloned())
    }

    async fn snapshot(&self, object_key: &str) -> Result<HashMap<String, Bytes>, EndpointError> {
        self.check_available()?;
        let objects = self.objects.read().await;
        Ok(objects.get(object_key).cloned().unwrap_or_default())
    }

    async fn commit(
        &self,
        object_key: &str,
        writes: Vec<StateWrite>,
    ) -> Result<(), EndpointError> {
        self.check_available()?;
        let mut objects = self.objects.write().await;
        // Nothing below can fail, so holding the write lock makes the batch atomic.
        let state = objects.entry(object_key.to_string()).or_default();
        apply_writes(state, writes);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
