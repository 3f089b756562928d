//! End-to-end scenarios for the Greeter services.
//!
//! These tests drive requests through the router the way a host binding
//! does and check both the responses and the committed object state.

mod common;

use std::sync::Arc;

use durable_object_endpoint::services::{GREETER_COUNT, GREETER_OBJECT_COUNT};
use durable_object_endpoint::{
    services, EndpointConfig, EndpointManifest, ErrorObject, FileStateStore, HandlerError,
    HandlerRegistry, InvocationRouter, KeyedStateStore, ObjectContext, RequestEnvelope,
    ServiceDefinition, StateKey, StoreConfig, SERVER_HEADER, SERVER_VERSION,
};

use common::*;

// =============================================================================
// Greeter.greet
// =============================================================================

#[tokio::test]
async fn test_first_greeting() {
    let (router, store) = greeter_router();

    let response = invoke(&router, "Greeter", "greet", "alice", r#""Hello""#).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type, "application/json");
    assert_eq!(body_string(&response), "Hello alice, for the 1-th time");
    assert_eq!(
        committed_u32(store.as_ref(), "alice", GREETER_COUNT.name()).await,
        Some(1)
    );
}

#[tokio::test]
async fn test_second_greeting_increments() {
    let (router, store) = greeter_router();

    invoke(&router, "Greeter", "greet", "alice", r#""Hello""#).await;
    let response = invoke(&router, "Greeter", "greet", "alice", r#""Hi""#).await;

    assert_eq!(body_string(&response), "Hi alice, for the 2-th time");
    assert_eq!(
        committed_u32(store.as_ref(), "alice", GREETER_COUNT.name()).await,
        Some(2)
    );
}

#[tokio::test]
async fn test_keys_are_counted_separately() {
    let (router, store) = greeter_router();

    invoke(&router, "Greeter", "greet", "alice", r#""Hello""#).await;
    let response = invoke(&router, "Greeter", "greet", "bob", r#""Hello""#).await;

    assert_eq!(body_string(&response), "Hello bob, for the 1-th time");
    assert_eq!(
        committed_u32(store.as_ref(), "alice", GREETER_COUNT.name()).await,
        Some(1)
    );
}

// =============================================================================
// GreeterObject.ungreet
// =============================================================================

#[tokio::test]
async fn test_ungreet_at_zero_stays_at_zero() {
    let (router, store) = greeter_router();

    let response = invoke(&router, "GreeterObject", "ungreet", "bob", "").await;

    assert_eq!(response.status, 200);
    assert!(body_string(&response).contains("taking one greeting back: 0"));
    assert_eq!(
        committed_u32(store.as_ref(), "bob", GREETER_OBJECT_COUNT.name()).await,
        None
    );
    // Nothing was staged, so nothing was committed.
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn test_ungreet_takes_one_back() {
    let (router, store) = greeter_router();

    invoke(&router, "GreeterObject", "greet", "bob", r#""Hello""#).await;
    invoke(&router, "GreeterObject", "greet", "bob", r#""Hello""#).await;
    let response = invoke(&router, "GreeterObject", "ungreet", "bob", "null").await;

    assert_eq!(body_string(&response), "Dear bob, taking one greeting back: 2");
    assert_eq!(
        committed_u32(store.as_ref(), "bob", GREETER_OBJECT_COUNT.name()).await,
        Some(1)
    );
}

#[tokio::test]
async fn test_ungreet_on_stored_zero_stays_at_zero() {
    let (router, store) = greeter_router();

    invoke(&router, "GreeterObject", "greet", "bob", r#""Hello""#).await;
    let first = invoke(&router, "GreeterObject", "ungreet", "bob", "").await;
    assert_eq!(body_string(&first), "Dear bob, taking one greeting back: 1");
    assert_eq!(
        committed_u32(store.as_ref(), "bob", GREETER_OBJECT_COUNT.name()).await,
        Some(0)
    );
    let commits = store.commit_count();

    let second = invoke(&router, "GreeterObject", "ungreet", "bob", "").await;
    assert_eq!(second.status, 200);
    assert_eq!(body_string(&second), "Dear bob, taking one greeting back: 0");
    assert_eq!(
        committed_u32(store.as_ref(), "bob", GREETER_OBJECT_COUNT.name()).await,
        Some(0)
    );
    assert_eq!(store.commit_count(), commits);
}

// =============================================================================
// Error responses
// =============================================================================

#[tokio::test]
async fn test_unknown_handler_is_not_found_and_state_untouched() {
    let (router, store) = greeter_router();
    invoke(&router, "Greeter", "greet", "alice", r#""Hello""#).await;
    let before = store.snapshot("alice").await.unwrap();

    let response = invoke(&router, "Greeter", "wave", "alice", r#""Hello""#).await;

    assert_eq!(response.status, 404);
    let error = response.error_object().unwrap();
    assert_eq!(error.error_type, "HandlerNotFound");
    assert_eq!(error.error_message, "Handler not found: Greeter/wave");
    assert_eq!(store.snapshot("alice").await.unwrap(), before);
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test]
async fn test_error_mapping_is_stable() {
    let (router, _store) = greeter_router();

    let first = invoke(&router, "Nope", "greet", "alice", "").await;
    let second = invoke(&router, "Nope", "greet", "alice", "").await;

    assert_eq!(first.status, second.status);
    assert_eq!(first.body, second.body);
}

#[tokio::test]
async fn test_invocation_requires_post() {
    let (router, _store) = greeter_router();
    let request = RequestEnvelope::get("/invoke/Greeter/greet").with_header("x-object-key", "alice");

    let response = router.route(request).await;

    assert_eq!(response.status, 405);
    assert_eq!(response.error_object().unwrap().error_type, "MethodNotAllowed");
}

#[tokio::test]
async fn test_missing_object_key_is_malformed() {
    let (router, store) = greeter_router();
    let request = RequestEnvelope::post("/invoke/Greeter/greet").with_body(r#""Hello""#);

    let response = router.route(request).await;

    assert_eq!(response.status, 400);
    assert_eq!(response.error_object().unwrap().error_type, "MalformedRequest");
    assert_eq!(store.object_count().await, 0);
}

#[tokio::test]
async fn test_short_path_is_malformed() {
    let (router, _store) = greeter_router();
    let request = RequestEnvelope::post("/invoke/Greeter").with_header("x-object-key", "alice");

    let response = router.route(request).await;

    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_undecodable_payload_is_malformed() {
    let (router, store) = greeter_router();

    let response = invoke(&router, "Greeter", "greet", "alice", "42").await;

    assert_eq!(response.status, 400);
    assert_eq!(response.error_object().unwrap().error_type, "MalformedRequest");
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn test_every_response_identifies_the_server() {
    let (router, _store) = greeter_router();

    let ok = invoke(&router, "Greeter", "greet", "alice", r#""Hello""#).await;
    let not_found = invoke(&router, "Greeter", "wave", "alice", "").await;

    assert_eq!(ok.header(SERVER_HEADER), Some(SERVER_VERSION));
    assert_eq!(not_found.header(SERVER_HEADER), Some(SERVER_VERSION));
}

// =============================================================================
// Rollback
// =============================================================================

const AUDIT: StateKey<Vec<String>> = StateKey::new("audit");

fn audit_router() -> (InvocationRouter, Arc<durable_object_endpoint::InMemoryStateStore>) {
    let store = durable_object_endpoint::InMemoryStateStore::shared();
    let mut registry = HandlerRegistry::new();
    registry
        .register_service(ServiceDefinition::new("Audit").handler(
            "record",
            |ctx: ObjectContext, (entry, fail): (String, bool)| async move {
                let mut audit = ctx.get_as(&AUDIT).await?.unwrap_or_default();
                audit.push(entry);
                ctx.set_as(&AUDIT, &audit)?;
                if fail {
                    return Err(HandlerError::with_type("AuditRejected", "entry rejected"));
                }
                Ok(audit.len())
            },
        ))
        .unwrap();
    (InvocationRouter::new(registry, store.clone()), store)
}

#[tokio::test]
async fn test_failed_handler_commits_nothing() {
    let (router, store) = audit_router();

    invoke(&router, "Audit", "record", "ledger", r#"["first", false]"#).await;
    let failed = invoke(&router, "Audit", "record", "ledger", r#"["second", true]"#).await;
    let next = invoke(&router, "Audit", "record", "ledger", r#"["third", false]"#).await;

    assert_eq!(failed.status, 500);
    assert_eq!(
        failed.error_object().unwrap(),
        ErrorObject::new("AuditRejected", "entry rejected")
    );
    assert_eq!(&next.body[..], b"2");

    let raw = store.get("ledger", "audit").await.unwrap().unwrap();
    let audit: Vec<String> = serde_json::from_slice(&raw).unwrap();
    assert_eq!(audit, vec!["first", "third"]);
}

#[tokio::test]
async fn test_failed_commit_is_store_unavailable_and_changes_nothing() {
    let store = Arc::new(RecordingStateStore::new().with_failing_commits(1));
    let router = InvocationRouter::new(services::default_registry().unwrap(), store.clone());

    let failed = invoke(&router, "Greeter", "greet", "alice", r#""Hello""#).await;
    assert_eq!(failed.status, 503);
    assert_eq!(failed.error_object().unwrap().error_type, "StoreUnavailable");
    assert_eq!(committed_u32(store.as_ref(), "alice", "counter").await, None);

    // The slot was released and the next attempt starts from the old state.
    let retried = invoke(&router, "Greeter", "greet", "alice", r#""Hello""#).await;
    assert_eq!(body_string(&retried), "Hello alice, for the 1-th time");
    assert_eq!(store.commit_calls().len(), 2);
    assert!(router.locks().is_empty());
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_discovery_lists_every_handler() {
    let (router, _store) = greeter_router();

    let response = router.route(RequestEnvelope::get("/api/discover/")).await;

    assert_eq!(response.status, 200);
    let manifest: EndpointManifest = serde_json::from_slice(&response.body).unwrap();
    let greeter = manifest.service("Greeter").unwrap();
    assert_eq!(greeter.handler_names(), vec!["greet"]);
    let object = manifest.service("GreeterObject").unwrap();
    assert_eq!(object.handler_names(), vec!["greet", "ungreet"]);

    let raw: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(raw["protocolMode"], "REQUEST_RESPONSE");
    assert_eq!(raw["services"][0]["ty"], "VIRTUAL_OBJECT");
    assert_eq!(
        raw["services"][0]["handlers"][0]["input"]["contentType"],
        "application/json"
    );

    let greet = &greeter.handlers[0];
    assert_eq!(
        greet.input.type_name.as_deref(),
        Some(std::any::type_name::<String>())
    );
    assert_eq!(
        greet.output.type_name.as_deref(),
        Some(std::any::type_name::<String>())
    );
    let ungreet = &object.handlers[1];
    assert_eq!(ungreet.input.type_name.as_deref(), Some("()"));
}

// =============================================================================
// File-backed store
// =============================================================================

#[tokio::test]
async fn test_file_store_survives_router_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = EndpointConfig::default().with_store(StoreConfig::File {
        root: dir.path().to_path_buf(),
    });

    let router = InvocationRouter::from_config(services::default_registry().unwrap(), config.clone())
        .unwrap();
    invoke(&router, "Greeter", "greet", "alice", r#""Hello""#).await;
    drop(router);

    let router =
        InvocationRouter::from_config(services::default_registry().unwrap(), config).unwrap();
    let response = invoke(&router, "Greeter", "greet", "alice", r#""Hello""#).await;
    assert_eq!(body_string(&response), "Hello alice, for the 2-th time");

    let reopened = FileStateStore::new(dir.path());
    assert_eq!(committed_u32(&reopened, "alice", "counter").await, Some(2));
}
