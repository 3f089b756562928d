//! Object state storage and per-key execution slots.
//!
//! ## Module Structure
//!
//! - `store` - The [`KeyedStateStore`] contract and the in-memory backend
//! - `file_store` - A file-backed store, one JSON document per object key
//! - `locks` - Per-object-key mutual exclusion ([`KeyedLockTable`])
//!
//! ## Visibility Rules
//!
//! 1. **Committed reads only**: `get` and `snapshot` never observe writes that
//!    an in-flight invocation has staged.
//!
//! 2. **Atomic commits**: `commit` applies an invocation's staged writes all
//!    at once or not at all.
//!
//! 3. **Single writer per key**: the router commits only while holding the
//!    object's [`ObjectGuard`], so two commits for the same key never race.

mod file_store;
mod locks;
mod store;

pub use file_store::FileStateStore;
pub use locks::{KeyedLockTable, ObjectGuard};
pub use store::{InMemoryStateStore, KeyedStateStore, SharedStateStore, StateWrite};
