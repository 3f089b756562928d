//! # Durable Object Endpoint
//!
//! A small runtime for keyed virtual objects behind an AWS Lambda HTTP
//! trigger.
//!
//! ## Overview
//!
//! A virtual object is a named service whose handlers run against the state
//! of one object key. Invocations on the same key never overlap; invocations
//! on different keys run concurrently. A handler's state writes are staged
//! and become visible all at once when it succeeds, or not at all when it
//! fails.
//!
//! ### Key Features
//!
//! - **Per-key exclusivity**: an async mutex per object key, created on first
//!   use and reclaimed when idle.
//! - **All-or-nothing state**: writes are buffered in the [`ObjectContext`]
//!   and committed atomically by the router.
//! - **Typed state**: [`StateKey`] binds a state name to a value type and codec.
//! - **Discovery**: the registry renders a JSON manifest of every handler.
//! - **Lambda binding**: API Gateway proxy events in, proxy responses out.
//!
//! ## Getting Started
//!
//! ```rust,ignore
//! use durable_object_endpoint::{
//!     HandlerError, HandlerRegistry, InMemoryStateStore, InvocationRouter, ObjectContext,
//!     RequestEnvelope, ServiceDefinition, StateKey,
//! };
//!
//! const VISITS: StateKey<u64> = StateKey::new("visits");
//!
//! async fn visit(ctx: ObjectContext, _: ()) -> Result<u64, HandlerError> {
//!     let visits = ctx.get_as(&VISITS).await?.unwrap_or(0) + 1;
//!     ctx.set_as(&VISITS, &visits)?;
//!     Ok(visits)
//! }
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_service(ServiceDefinition::new("Page").handler("visit", visit))?;
//! let router = InvocationRouter::new(registry, InMemoryStateStore::shared());
//!
//! let response = router
//!     .route(RequestEnvelope::post("/invoke/Page/visit").with_header("x-object-key", "home"))
//!     .await;
//! assert_eq!(&response.body[..], b"1");
//! ```
//!
//! ## Request Format
//!
//! - `POST .../invoke/{service}/{handler}` with the object key in the
//!   `x-object-key` header and a JSON payload invokes a handler.
//! - Any request whose path ends in `/discover` returns the manifest.
//!
//! ## Error Handling
//!
//! Every failure is an [`EndpointError`] with a fixed status code and an
//! [`ErrorObject`] body (`{"ErrorType": ..., "ErrorMessage": ...}`):
//!
//! - **MalformedRequest** (400): bad path, missing key, undecodable payload
//! - **HandlerNotFound** (404)
//! - **MethodNotAllowed** (405)
//! - **HandlerExecution** (500): the handler failed or panicked
//! - **StoreUnavailable** / **LockTimeout** (503)
//!
//! Handlers return [`HandlerError`]; endpoint errors raised inside a handler
//! keep their own status.
//!
//! ## Logging
//!
//! Each invocation runs inside an `invocation` span carrying `service`,
//! `handler` and `object_key`. Lock acquisition and commits log at `debug`,
//! failures at `warn`.
//!
//! ## Module Organization
//!
//! - [`config`]: Endpoint configuration and environment loading
//! - [`context`]: The per-invocation [`ObjectContext`]
//! - [`envelope`]: Transport-neutral request and response envelopes
//! - [`error`]: Error types and status mapping
//! - [`lambda`]: API Gateway binding
//! - [`manifest`]: Discovery manifest types
//! - [`registry`]: Handler registration and lookup
//! - [`router`]: The invocation lifecycle
//! - [`serdes`]: Serialization/deserialization system
//! - [`services`]: Example Greeter services
//! - [`state`]: State stores and per-key locks

pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod lambda;
pub mod manifest;
pub mod registry;
pub mod router;
pub mod serdes;
pub mod services;
pub mod state;

// Re-export main types at crate root
pub use config::{EndpointConfig, StoreConfig};
pub use context::ObjectContext;
pub use envelope::{RequestEnvelope, ResponseEnvelope, SERVER_HEADER, SERVER_VERSION};
pub use error::{EndpointError, ErrorObject, HandlerError};
pub use manifest::{EndpointManifest, HandlerManifest, PayloadManifest, ServiceManifest};
pub use registry::{HandlerDescriptor, HandlerFn, HandlerRegistry, PayloadSchema, ServiceDefinition};
pub use router::{create_invocation_span, InvocationRouter, InvocationTarget, Route};
pub use serdes::{JsonSerDes, SerDes, SerDesContext, SerDesError, StateKey};
pub use state::{
    FileStateStore, InMemoryStateStore, KeyedLockTable, KeyedStateStore, ObjectGuard,
    SharedStateStore, StateWrite,
};
