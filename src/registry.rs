//! Handler registration and lookup.
//!
//! Handlers are grouped into services with a [`ServiceDefinition`] and
//! registered once, during process initialisation, into a
//! [`HandlerRegistry`]. The registry is then handed to the router and never
//! changes again.
//!
//! ```rust,ignore
//! use durable_object_endpoint::{HandlerRegistry, ServiceDefinition};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_service(
//!     ServiceDefinition::new("Greeter").handler("greet", |ctx, greeting: String| async move {
//!         Ok(format!("{} {}", greeting, ctx.key()))
//!     }),
//! )?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};

use crate::context::ObjectContext;
use crate::error::{EndpointError, HandlerError};
use crate::manifest::{EndpointManifest, HandlerManifest, PayloadManifest, ServiceManifest};
use crate::serdes::{SerDesError, JSON_CONTENT_TYPE};

/// Type-erased handler function: raw payload in, raw payload out.
pub type HandlerFn =
    Arc<dyn Fn(ObjectContext, Bytes) -> BoxFuture<'static, Result<Bytes, EndpointError>> + Send + Sync>;

/// Content type and type description of a handler's input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSchema {
    /// Content type of the payload bytes
    pub content_type: String,
    /// Rust type name of the decoded value, when known
    pub type_name: Option<String>,
}

impl PayloadSchema {
    /// Schema for a JSON-encoded value of type `T`.
    pub fn json<T>() -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE.to_string(),
            type_name: Some(std::any::type_name::<T>().to_string()),
        }
    }

    /// Schema for opaque bytes of the given content type.
    pub fn raw(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            type_name: None,
        }
    }
}

/// A registered handler.
#[derive(Clone)]
pub struct HandlerDescriptor {
    service_name: String,
    handler_name: String,
    input: PayloadSchema,
    output: PayloadSchema,
    handler: HandlerFn,
}

impl HandlerDescriptor {
    /// Creates a descriptor for a raw handler function.
    pub fn new(
        service_name: impl Into<String>,
        handler_name: impl Into<String>,
        input: PayloadSchema,
        output: PayloadSchema,
        handler: HandlerFn,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            handler_name: handler_name.into(),
            input,
            output,
            handler,
        }
    }

    /// The service this handler belongs to.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The handler name.
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// Input payload schema.
    pub fn input(&self) -> &PayloadSchema {
        &self.input
    }

    /// Output payload schema.
    pub fn output(&self) -> &PayloadSchema {
        &self.output
    }

    /// Runs the handler.
    pub fn invoke(
        &self,
        ctx: ObjectContext,
        payload: Bytes,
    ) -> BoxFuture<'static, Result<Bytes, EndpointError>> {
        (self.handler)(ctx, payload)
    }

    fn manifest(&self) -> HandlerManifest {
        HandlerManifest {
            name: self.handler_name.clone(),
            input: PayloadManifest::from(&self.input),
            output: PayloadManifest::from(&self.output),
        }
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("service_name", &self.service_name)
            .field("handler_name", &self.handler_name)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// Decodes a JSON handler input. An empty body decodes as JSON `null`, so
/// handlers taking `()` or `Option<T>` accept requests without a payload.
fn decode_input<I: DeserializeOwned>(
    object_key: &str,
    handler_name: &str,
    payload: &[u8],
) -> Result<I, EndpointError> {
    let payload: &[u8] = if payload.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        payload
    };
    serde_json::from_slice(payload).map_err(|e| {
        tracing::debug!(
            object_key = object_key,
            handler = handler_name,
            error = %e,
            "Rejected undecodable payload"
        );
        EndpointError::malformed(format!(
            "payload for handler '{}' could not be decoded: {}",
            handler_name, e
        ))
    })
}

fn encode_output<O: Serialize>(output: &O) -> Result<Bytes, EndpointError> {
    serde_json::to_vec(output)
        .map(Bytes::from)
        .map_err(|e| EndpointError::SerDes(SerDesError::serialization(e.to_string())))
}

/// A named group of handlers sharing one virtual object type.
pub struct ServiceDefinition {
    name: String,
    handlers: Vec<HandlerDescriptor>,
}

impl ServiceDefinition {
    /// Starts a new service definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
        }
    }

    /// The service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handlers added so far.
    pub fn handlers(&self) -> &[HandlerDescriptor] {
        &self.handlers
    }

    /// Adds a handler with JSON-encoded input and output.
    pub fn handler<I, O, F, Fut>(mut self, name: impl Into<String>, func: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(ObjectContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, HandlerError>> + Send + 'static,
    {
        let handler_name: String = name.into();
        let func = Arc::new(func);
        let name_for_fn = handler_name.clone();

        let handler: HandlerFn = Arc::new(move |ctx: ObjectContext, payload: Bytes| {
            let func = Arc::clone(&func);
            let handler_name = name_for_fn.clone();
            async move {
                let input: I = decode_input(ctx.key(), &handler_name, &payload)?;
                let output = func(ctx, input).await?;
                encode_output(&output)
            }
            .boxed()
        });

        self.handlers.push(HandlerDescriptor::new(
            self.name.clone(),
            handler_name,
            PayloadSchema::json::<I>(),
            PayloadSchema::json::<O>(),
            handler,
        ));
        self
    }

    /// Adds a handler working on raw payload bytes.
    pub fn raw_handler<F, Fut>(
        mut self,
        name: impl Into<String>,
        input: PayloadSchema,
        output: PayloadSchema,
        func: F,
    ) -> Self
    where
        F: Fn(ObjectContext, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, HandlerError>> + Send + 'static,
    {
        let func = Arc::new(func);
        let handler: HandlerFn = Arc::new(move |ctx: ObjectContext, payload: Bytes| {
            let fut = func(ctx, payload);
            async move { fut.await.map_err(EndpointError::from) }.boxed()
        });
        self.handlers.push(HandlerDescriptor::new(
            self.name.clone(),
            name,
            input,
            output,
            handler,
        ));
        self
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Maps (service name, handler name) to handler descriptors.
///
/// Lookups are exact and case-sensitive.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    services: BTreeMap<String, BTreeMap<String, Arc<HandlerDescriptor>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one handler.
    ///
    /// Fails with [`EndpointError::DuplicateHandler`] if the pair is taken.
    pub fn register(&mut self, descriptor: HandlerDescriptor) -> Result<(), EndpointError> {
        if self.contains(descriptor.service_name(), descriptor.handler_name()) {
            return Err(EndpointError::duplicate_handler(
                descriptor.service_name(),
                descriptor.handler_name(),
            ));
        }
        tracing::debug!(
            service = %descriptor.service_name(),
            handler = %descriptor.handler_name(),
            "Registered handler"
        );
        self.services
            .entry(descriptor.service_name().to_string())
            .or_default()
            .insert(descriptor.handler_name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Registers every handler of a service.
    ///
    /// Nothing is registered if any handler collides with an existing one or
    /// with another handler of the same definition.
    pub fn register_service(&mut self, service: ServiceDefinition) -> Result<(), EndpointError> {
        let mut seen = std::collections::HashSet::new();
        for descriptor in &service.handlers {
            if self.contains(&service.name, descriptor.handler_name())
                || !seen.insert(descriptor.handler_name())
            {
                return Err(EndpointError::duplicate_handler(
                    &service.name,
                    descriptor.handler_name(),
                ));
            }
        }
        for descriptor in service.handlers {
            self.register(descriptor)?;
        }
        Ok(())
    }

    /// Looks up a handler.
    ///
    /// Fails with [`EndpointError::HandlerNotFound`] if absent. Resolving the
    /// same pair twice returns the same descriptor.
    pub fn resolve(
        &self,
        service_name: &str,
        handler_name: &str,
    ) -> Result<Arc<HandlerDescriptor>, EndpointError> {
        self.services
            .get(service_name)
            .and_then(|handlers| handlers.get(handler_name))
            .cloned()
            .ok_or_else(|| EndpointError::handler_not_found(service_name, handler_name))
    }

    /// Returns true if the pair is registered.
    pub fn contains(&self, service_name: &str, handler_name: &str) -> bool {
        self.services
            .get(service_name)
            .map(|handlers| handlers.contains_key(handler_name))
            .unwrap_or(false)
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.services.values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Builds the discovery manifest. Services and handlers are sorted by name.
    pub fn manifest(&self) -> EndpointManifest {
        EndpointManifest::new(
            self.services
                .iter()
                .map(|(name, handlers)| {
                    ServiceManifest::virtual_object(
                        name,
                        handlers.values().map(|d| d.manifest()).collect(),
                    )
                })
                .collect(),
        )
    }
}
