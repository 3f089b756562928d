//! Request routing and the invocation lifecycle.
//!
//! [`InvocationRouter::route`] is the single entry point host bindings call.
//! An invocation moves through these phases:
//!
//! 1. **Parse**: the path and headers name a service, a handler and an object key
//! 2. **Resolve**: the registry yields the handler descriptor
//! 3. **Lock**: the object key's exclusive execution slot is acquired
//! 4. **Execute**: the handler runs against an [`ObjectContext`]
//! 5. **Commit / roll back**: staged writes are committed on success, dropped otherwise
//! 6. **Respond**: the output or the error becomes a [`ResponseEnvelope`]
//!
//! The slot is held by an [`ObjectGuard`](crate::state::ObjectGuard) and is
//! released on every exit path, including when the route future is dropped.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use tracing::{Instrument, Span};

use crate::config::EndpointConfig;
use crate::context::ObjectContext;
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::EndpointError;
use crate::registry::HandlerRegistry;
use crate::state::{KeyedLockTable, SharedStateStore};

/// Error type reported when a handler panics.
pub const HANDLER_PANIC_ERROR_TYPE: &str = "HandlerPanic";

/// The (service, handler, object key) triple an invocation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationTarget {
    pub service: String,
    pub handler: String,
    pub object_key: String,
}

impl InvocationTarget {
    pub fn new(
        service: impl Into<String>,
        handler: impl Into<String>,
        object_key: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            handler: handler.into(),
            object_key: object_key.into(),
        }
    }
}

/// What a parsed request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Serve the discovery manifest.
    Discover,
    /// Invoke a handler.
    Invoke(InvocationTarget),
}

/// Creates the tracing span wrapping one invocation.
pub fn create_invocation_span(target: &InvocationTarget) -> Span {
    tracing::info_span!(
        "invocation",
        service = target.service.as_str(),
        handler = target.handler.as_str(),
        object_key = target.object_key.as_str(),
    )
}

/// Routes requests to registered handlers with per-key mutual exclusion.
pub struct InvocationRouter {
    registry: Arc<HandlerRegistry>,
    store: SharedStateStore,
    locks: Arc<KeyedLockTable>,
    config: EndpointConfig,
}

impl InvocationRouter {
    /// Creates a router with the default configuration.
    pub fn new(registry: HandlerRegistry, store: SharedStateStore) -> Self {
        Self::with_config(registry, store, EndpointConfig::default())
    }

    /// Creates a router with an explicit configuration.
    ///
    /// The store is taken as given; `config.store` is ignored.
    pub fn with_config(
        registry: HandlerRegistry,
        store: SharedStateStore,
        config: EndpointConfig,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            locks: Arc::new(KeyedLockTable::new()),
            config,
        }
    }

    /// Creates a router whose store is built from `config.store`.
    pub fn from_config(
        registry: HandlerRegistry,
        config: EndpointConfig,
    ) -> Result<Self, EndpointError> {
        config.validate()?;
        let store = config.store.build();
        Ok(Self::with_config(registry, store, config))
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    pub fn locks(&self) -> &Arc<KeyedLockTable> {
        &self.locks
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Handles one request. Every failure becomes an error response.
    pub async fn route(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let result = match self.parse(&request) {
            Ok(Route::Discover) => self.discover(),
            Ok(Route::Invoke(target)) => self.invoke(target, request.body).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(response) => response,
            Err(error) => {
                if error.is_client_error() {
                    tracing::debug!(
                        path = %request.path,
                        status = error.status_code(),
                        error = %error,
                        "Rejected request"
                    );
                } else {
                    tracing::warn!(
                        path = %request.path,
                        status = error.status_code(),
                        error = %error,
                        "Request failed"
                    );
                }
                ResponseEnvelope::from_error(&error)
            }
        }
    }

    /// Works out what a request asks for.
    ///
    /// One trailing `/` is ignored. A path ending in the discovery path is a
    /// discovery request, whatever the method. Anything else must end in
    /// `{invoke}/{service}/{handler}`, use `POST`, and carry a non-empty
    /// object key header.
    pub fn parse(&self, request: &RequestEnvelope) -> Result<Route, EndpointError> {
        let path = request.path.strip_suffix('/').unwrap_or(&request.path);

        if path.ends_with(&self.config.discovery_path) {
            return Ok(Route::Discover);
        }

        let mut segments = path.rsplit('/');
        let (handler, service, invoke) = match (segments.next(), segments.next(), segments.next())
        {
            (Some(handler), Some(service), Some(invoke)) => (handler, service, invoke),
            _ => {
                return Err(EndpointError::malformed(format!(
                    "path '{}' does not match /{}/{{service}}/{{handler}}",
                    request.path, self.config.invoke_segment
                )))
            }
        };
        if !invoke.eq_ignore_ascii_case(&self.config.invoke_segment)
            || service.is_empty()
            || handler.is_empty()
        {
            return Err(EndpointError::malformed(format!(
                "path '{}' does not match /{}/{{service}}/{{handler}}",
                request.path, self.config.invoke_segment
            )));
        }

        if request.method != "POST" {
            return Err(EndpointError::MethodNotAllowed {
                method: request.method.clone(),
            });
        }

        let object_key = match request.header(&self.config.object_key_header) {
            Some(key) if !key.is_empty() => key,
            _ => {
                return Err(EndpointError::malformed(format!(
                    "missing object key header '{}'",
                    self.config.object_key_header
                )))
            }
        };

        Ok(Route::Invoke(InvocationTarget::new(service, handler, object_key)))
    }

    fn discover(&self) -> Result<ResponseEnvelope, EndpointError> {
        ResponseEnvelope::json(200, &self.registry.manifest())
    }

    /// Runs one invocation: resolve, lock, execute, then commit or roll back.
    pub async fn invoke(
        &self,
        target: InvocationTarget,
        payload: Bytes,
    ) -> Result<ResponseEnvelope, EndpointError> {
        let descriptor = self.registry.resolve(&target.service, &target.handler)?;
        let span = create_invocation_span(&target);

        async move {
            let _guard = self
                .locks
                .acquire_timeout(&target.object_key, self.config.lock_timeout)
                .await?;
            tracing::debug!("Acquired object slot");

            let ctx = ObjectContext::new(target.object_key.clone(), Arc::clone(&self.store));
            let outcome = AssertUnwindSafe(descriptor.invoke(ctx.clone(), payload))
                .catch_unwind()
                .await;

            let output = match outcome {
                Ok(Ok(output)) => output,
                Ok(Err(error)) => {
                    let discarded = ctx.discard();
                    tracing::warn!(discarded, error = %error, "Handler failed, state rolled back");
                    return Err(error);
                }
                Err(panic) => {
                    let discarded = ctx.discard();
                    let message = panic_message(panic.as_ref());
                    tracing::warn!(discarded, panic = %message, "Handler panicked, state rolled back");
                    return Err(EndpointError::HandlerExecution {
                        message,
                        error_type: HANDLER_PANIC_ERROR_TYPE.to_string(),
                    });
                }
            };

            let writes = ctx.take_writes();
            if !writes.is_empty() {
                let count = writes.len();
                self.store.commit(&target.object_key, writes).await?;
                tracing::debug!(writes = count, "Committed object state");
            }

            Ok(ResponseEnvelope::ok(
                descriptor.output().content_type.clone(),
                output,
            ))
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for InvocationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationRouter")
            .field("handlers", &self.registry.len())
            .field("busy_objects", &self.locks.len())
            .field("config", &self.config)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
