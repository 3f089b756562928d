//! Discovery manifest served on the discovery path.
//!
//! The manifest tells an orchestrator which services and handlers this
//! endpoint hosts. Field names are camelCase on the wire and enum values are
//! SCREAMING_SNAKE_CASE.

use serde::{Deserialize, Serialize};

use crate::registry::PayloadSchema;

/// How the endpoint exchanges invocation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolMode {
    /// One request, one response
    RequestResponse,
}

/// Kind of service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    /// Keyed service whose invocations are serialized per object key
    VirtualObject,
}

/// Top-level discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointManifest {
    pub protocol_mode: ProtocolMode,
    pub services: Vec<ServiceManifest>,
}

impl EndpointManifest {
    pub fn new(services: Vec<ServiceManifest>) -> Self {
        Self {
            protocol_mode: ProtocolMode::RequestResponse,
            services,
        }
    }

    /// Finds a service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceManifest> {
        self.services.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceManifest {
    pub name: String,
    pub ty: ServiceType,
    pub handlers: Vec<HandlerManifest>,
}

impl ServiceManifest {
    pub fn virtual_object(name: impl Into<String>, handlers: Vec<HandlerManifest>) -> Self {
        Self {
            name: name.into(),
            ty: ServiceType::VirtualObject,
            handlers,
        }
    }

    /// Names of the handlers in manifest order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerManifest {
    pub name: String,
    pub input: PayloadManifest,
    pub output: PayloadManifest,
}

/// Payload description of a handler input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadManifest {
    pub content_type: String,
    /// Rust type of the decoded value. Absent for raw payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl From<&PayloadSchema> for PayloadManifest {
    fn from(schema: &PayloadSchema) -> Self {
        Self {
            content_type: schema.content_type.clone(),
            type_name: schema.type_name.clone(),
        }
    }
}
