//! Transport-neutral request and response envelopes.
//!
//! Host bindings translate their native request shape into a
//! [`RequestEnvelope`], hand it to the router, and translate the returned
//! [`ResponseEnvelope`] back.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{EndpointError, ErrorObject};
use crate::serdes::JSON_CONTENT_TYPE;

/// Header identifying this endpoint on every response.
pub const SERVER_HEADER: &str = "x-durable-object-server";

/// Value of [`SERVER_HEADER`].
pub const SERVER_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const CONTENT_TYPE_HEADER: &str = "content-type";

/// An inbound request.
///
/// Header names are stored lowercase, so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// HTTP method, uppercase
    pub method: String,
    /// Request path, without query string
    pub path: String,
    /// Headers keyed by lowercase name
    pub headers: BTreeMap<String, String>,
    /// Raw payload
    pub body: Bytes,
}

impl RequestEnvelope {
    /// Creates a request with the given method and path.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Adds a header. The name is lowercased.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Looks up a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The request content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE_HEADER)
    }
}

/// An outbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub content_type: String,
    /// Extra headers keyed by lowercase name
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl ResponseEnvelope {
    /// Creates a response carrying the server header.
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(SERVER_HEADER.to_string(), SERVER_VERSION.to_string());
        Self {
            status,
            content_type: content_type.into(),
            headers,
            body: body.into(),
        }
    }

    /// A 200 response.
    pub fn ok(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(200, content_type, body)
    }

    /// A JSON response with the given status.
    pub fn json<T: serde::Serialize>(status: u16, value: &T) -> Result<Self, EndpointError> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(status, JSON_CONTENT_TYPE, body))
    }

    /// An error response with an [`ErrorObject`] body.
    pub fn from_error(error: &EndpointError) -> Self {
        let object = ErrorObject::from(error);
        // ErrorObject only holds strings, so encoding cannot fail.
        let body = serde_json::to_vec(&object).unwrap_or_default();
        Self::new(error.status_code(), JSON_CONTENT_TYPE, body)
    }

    /// Looks up a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes an error body, if this is an error response.
    pub fn error_object(&self) -> Option<ErrorObject> {
        if self.is_success() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }
}
