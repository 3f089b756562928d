//! The per-invocation handle to a virtual object's state.
//!
//! An [`ObjectContext`] is bound to one object key for the lifetime of one
//! invocation. Reads go through to the state store once and are memoised;
//! writes are staged in memory and only reach the store when the router
//! commits after the handler succeeds.
//!
//! ```rust,ignore
//! use durable_object_endpoint::{HandlerError, ObjectContext, StateKey};
//!
//! const COUNT: StateKey<u32> = StateKey::new("counter");
//!
//! async fn greet(ctx: ObjectContext, greeting: String) -> Result<String, HandlerError> {
//!     let count = ctx.get_as(&COUNT).await?.unwrap_or(0) + 1;
//!     ctx.set_as(&COUNT, &count)?;
//!     Ok(format!("{} {}, for the {}-th time", greeting, ctx.key(), count))
//! }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::error::EndpointError;
use crate::serdes::{SerDes, StateKey};
use crate::state::{SharedStateStore, StateWrite};

/// Handle to one virtual object's state during one invocation.
///
/// Cloning is cheap; clones share the same staged buffer.
#[derive(Clone)]
pub struct ObjectContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    object_key: String,
    store: SharedStateStore,
    buffer: Mutex<StateBuffer>,
}

#[derive(Default)]
struct StateBuffer {
    /// First committed value observed for each state name.
    reads: HashMap<String, Option<Bytes>>,
    /// Latest staged value for each state name (`None` = cleared).
    staged: HashMap<String, Option<Bytes>>,
    /// Staged writes in the order the handler issued them.
    journal: Vec<StateWrite>,
    /// Set once the router has taken or discarded the writes.
    closed: bool,
}

impl ObjectContext {
    /// Creates a context bound to `object_key`.
    pub fn new(object_key: impl Into<String>, store: SharedStateStore) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                object_key: object_key.into(),
                store,
                buffer: Mutex::new(StateBuffer::default()),
            }),
        }
    }

    /// The object key this invocation is bound to.
    pub fn key(&self) -> &str {
        &self.inner.object_key
    }

    /// Reads a state entry.
    ///
    /// Returns the value staged by this invocation if there is one, otherwise
    /// the committed value. The committed value is read from the store at most
    /// once per invocation; later reads return the same value even if the
    /// store changes in the meantime.
    pub async fn get(&self, state_name: &str) -> Result<Option<Bytes>, EndpointError> {
        {
            let buffer = self.buffer();
            if let Some(staged) = buffer.staged.get(state_name) {
                return Ok(staged.clone());
            }
            if let Some(read) = buffer.reads.get(state_name) {
                return Ok(read.clone());
            }
        }

        let committed = self.inner.store.get(self.key(), state_name).await?;

        let mut buffer = self.buffer();
        // A clone may have staged or read the same entry while we awaited the store.
        if let Some(staged) = buffer.staged.get(state_name) {
            return Ok(staged.clone());
        }
        Ok(buffer
            .reads
            .entry(state_name.to_string())
            .or_insert(committed)
            .clone())
    }

    /// Stages a new value for a state entry.
    pub fn set(&self, state_name: impl Into<String>, value: impl Into<Bytes>) {
        self.stage(StateWrite::set(state_name, value));
    }

    /// Stages the removal of a state entry.
    pub fn clear(&self, state_name: impl Into<String>) {
        self.stage(StateWrite::clear(state_name));
    }

    /// Reads and decodes a typed state entry with the key's codec.
    pub async fn get_as<T, S>(&self, key: &StateKey<T, S>) -> Result<Option<T>, EndpointError>
    where
        S: SerDes<T>,
    {
        match self.get(key.name()).await? {
            Some(raw) => Ok(Some(key.decode(self.key(), &raw)?)),
            None => Ok(None),
        }
    }

    /// Encodes and stages a typed state entry.
    pub fn set_as<T, S>(&self, key: &StateKey<T, S>, value: &T) -> Result<(), EndpointError>
    where
        S: SerDes<T>,
    {
        let encoded = key.encode(self.key(), value)?;
        self.set(key.name(), encoded);
        Ok(())
    }

    /// Stages the removal of a typed state entry.
    pub fn clear_key<T, S>(&self, key: &StateKey<T, S>) {
        self.clear(key.name());
    }

    /// Names of the state entries visible to this invocation.
    ///
    /// Committed entries plus staged sets, minus staged clears, sorted.
    pub async fn state_keys(&self) -> Result<Vec<String>, EndpointError> {
        let committed = self.inner.store.snapshot(self.key()).await?;
        let mut names: BTreeSet<String> = committed.into_keys().collect();
        let buffer = self.buffer();
        for (name, value) in &buffer.staged {
            if value.is_some() {
                names.insert(name.clone());
            } else {
                names.remove(name);
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Number of writes staged so far.
    pub fn staged_len(&self) -> usize {
        self.buffer().journal.len()
    }

    /// Closes the context and returns the staged writes in issue order.
    pub(crate) fn take_writes(&self) -> Vec<StateWrite> {
        let mut buffer = self.buffer();
        buffer.closed = true;
        buffer.staged.clear();
        std::mem::take(&mut buffer.journal)
    }

    /// Closes the context and drops every staged write.
    pub(crate) fn discard(&self) -> usize {
        self.take_writes().len()
    }

    fn stage(&self, write: StateWrite) {
        let mut buffer = self.buffer();
        if buffer.closed {
            tracing::warn!(
                object_key = %self.key(),
                state_name = %write.state_name,
                "Ignoring state write issued after the invocation completed"
            );
            return;
        }
        buffer
            .staged
            .insert(write.state_name.clone(), write.value.clone());
        buffer.journal.push(write);
    }

    fn buffer(&self) -> MutexGuard<'_, StateBuffer> {
        // Handler code never runs while the buffer lock is held.
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ObjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectContext")
            .field("object_key", &self.inner.object_key)
            .field("staged", &self.staged_len())
            .finish()
    }
}
