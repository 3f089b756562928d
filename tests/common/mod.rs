//! Shared test utilities for integration tests.
//!
//! This module provides helper functions, a scriptable state store and
//! proptest strategies used across integration tests.

#![allow(dead_code)] // These utilities are used by other integration test files

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use durable_object_endpoint::{
    services, EndpointError, InMemoryStateStore, InvocationRouter, KeyedStateStore,
    RequestEnvelope, ResponseEnvelope, StateWrite,
};
use proptest::prelude::*;

// =============================================================================
// Recording State Store
// =============================================================================

/// Record of a commit call for test verification.
#[derive(Debug, Clone)]
pub struct CommitCall {
    pub object_key: String,
    pub writes: Vec<StateWrite>,
}

/// A state store that records commits and can be told to fail them.
///
/// Reads and successful commits are delegated to an [`InMemoryStateStore`].
pub struct RecordingStateStore {
    inner: InMemoryStateStore,
    failing_commits: Mutex<usize>,
    commit_calls: Mutex<Vec<CommitCall>>,
}

impl RecordingStateStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStateStore::new(),
            failing_commits: Mutex::new(0),
            commit_calls: Mutex::new(Vec::new()),
        }
    }

    /// Makes the next `count` commits fail with `StoreUnavailable`.
    pub fn with_failing_commits(self, count: usize) -> Self {
        *self.failing_commits.lock().unwrap() = count;
        self
    }

    pub fn commit_calls(&self) -> Vec<CommitCall> {
        self.commit_calls.lock().unwrap().clone()
    }
}

impl Default for RecordingStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyedStateStore for RecordingStateStore {
    async fn get(
        &self,
        object_key: &str,
        state_name: &str,
    ) -> Result<Option<Bytes>, EndpointError> {
        self.inner.get(object_key, state_name).await
    }

    async fn snapshot(&self, object_key: &str) -> Result<HashMap<String, Bytes>, EndpointError> {
        self.inner.snapshot(object_key).await
    }

    async fn commit(
        &self,
        object_key: &str,
        writes: Vec<StateWrite>,
    ) -> Result<(), EndpointError> {
        self.commit_calls.lock().unwrap().push(CommitCall {
            object_key: object_key.to_string(),
            writes: writes.clone(),
        });
        {
            let mut failing = self.failing_commits.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(EndpointError::store_unavailable("scripted commit failure"));
            }
        }
        self.inner.commit(object_key, writes).await
    }
}

// =============================================================================
// Router Helpers
// =============================================================================

/// A router hosting the Greeter services over a fresh in-memory store.
pub fn greeter_router() -> (Arc<InvocationRouter>, Arc<InMemoryStateStore>) {
    let store = InMemoryStateStore::shared();
    let registry = services::default_registry().unwrap();
    let router = InvocationRouter::new(registry, store.clone());
    (Arc::new(router), store)
}

/// Builds an invocation request.
pub fn invoke_request(service: &str, handler: &str, key: &str, body: &str) -> RequestEnvelope {
    RequestEnvelope::post(format!("/api/invoke/{}/{}", service, handler))
        .with_header("x-object-key", key)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
}

/// Invokes a handler and returns the response.
pub async fn invoke(
    router: &InvocationRouter,
    service: &str,
    handler: &str,
    key: &str,
    body: &str,
) -> ResponseEnvelope {
    router
        .route(invoke_request(service, handler, key, body))
        .await
}

/// Decodes a JSON string response body.
pub fn body_string(response: &ResponseEnvelope) -> String {
    serde_json::from_slice(&response.body).unwrap()
}

/// Reads a committed JSON `u32` state entry.
pub async fn committed_u32(store: &dyn KeyedStateStore, key: &str, state_name: &str) -> Option<u32> {
    store
        .get(key, state_name)
        .await
        .unwrap()
        .map(|raw| serde_json::from_slice(&raw).unwrap())
}

// =============================================================================
// Proptest Strategies
// =============================================================================

/// Strategy for generating object keys.
pub fn object_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,24}".prop_map(|s| s)
}

/// Strategy for generating state names.
pub fn state_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("counter".to_string()),
        Just("name".to_string()),
        Just("visits".to_string()),
        "[a-z]{1,8}".prop_map(|s| s),
    ]
}

/// One state operation a handler may perform.
#[derive(Debug, Clone)]
pub enum StateOp {
    Set(String, Vec<u8>),
    Clear(String),
    Get(String),
}

/// Strategy for generating state operations.
pub fn state_op_strategy() -> impl Strategy<Value = StateOp> {
    prop_oneof![
        (state_name_strategy(), prop::collection::vec(any::<u8>(), 0..16))
            .prop_map(|(name, value)| StateOp::Set(name, value)),
        state_name_strategy().prop_map(StateOp::Clear),
        state_name_strategy().prop_map(StateOp::Get),
    ]
}

/// Strategy for generating sequences of state operations.
pub fn state_ops_strategy() -> impl Strategy<Value = Vec<StateOp>> {
    prop::collection::vec(state_op_strategy(), 0..24)
}
