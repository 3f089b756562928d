//! Error types for the durable object endpoint.
//!
//! Every failure the endpoint can produce is an [`EndpointError`]. Each
//! variant maps to exactly one HTTP status code and one error type string,
//! so identical failure causes always produce identical responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serdes::SerDesError;

/// The main error type for the durable object endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The request envelope does not have the expected shape.
    #[error("Malformed request: {message}")]
    MalformedRequest {
        /// What was wrong with the request
        message: String,
    },

    /// The request used an HTTP method the endpoint does not accept.
    #[error("Method not allowed: {method}")]
    MethodNotAllowed {
        /// The rejected method
        method: String,
    },

    /// No handler is registered under the requested service and handler name.
    #[error("Handler not found: {service}/{handler}")]
    HandlerNotFound {
        /// Requested service name
        service: String,
        /// Requested handler name
        handler: String,
    },

    /// A handler with the same service and handler name is already registered.
    ///
    /// Raised at startup only.
    #[error("Duplicate handler: {service}/{handler}")]
    DuplicateHandler {
        /// Service name of the duplicate
        service: String,
        /// Handler name of the duplicate
        handler: String,
    },

    /// The state store could not be reached. No partial commit happened.
    #[error("State store unavailable: {message}")]
    StoreUnavailable {
        /// Error message from the backend
        message: String,
    },

    /// The exclusive slot for an object key was not obtained in time.
    #[error("Timed out after {waited_ms} ms waiting for object '{object_key}'")]
    LockTimeout {
        /// The contended object key
        object_key: String,
        /// How long the invocation waited
        waited_ms: u64,
    },

    /// The handler returned a failure or panicked. Staged state was discarded.
    #[error("Handler execution failure: {message}")]
    HandlerExecution {
        /// Failure detail reported by the handler
        message: String,
        /// Error type reported by the handler
        error_type: String,
    },

    /// Serialization/deserialization error.
    #[error(transparent)]
    SerDes(#[from] SerDesError),

    /// Invalid configuration or arguments.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation failure
        message: String,
    },
}

impl EndpointError {
    /// Creates a new MalformedRequest error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Creates a new HandlerNotFound error.
    pub fn handler_not_found(service: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::HandlerNotFound {
            service: service.into(),
            handler: handler.into(),
        }
    }

    /// Creates a new DuplicateHandler error.
    pub fn duplicate_handler(service: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::DuplicateHandler {
            service: service.into(),
            handler: handler.into(),
        }
    }

    /// Creates a new StoreUnavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new HandlerExecution error with the generic error type.
    pub fn handler_failure(message: impl Into<String>) -> Self {
        Self::HandlerExecution {
            message: message.into(),
            error_type: HandlerError::DEFAULT_ERROR_TYPE.to_string(),
        }
    }

    /// Creates a new Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns the HTTP status code this error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedRequest { .. } => 400,
            Self::HandlerNotFound { .. } => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::StoreUnavailable { .. } | Self::LockTimeout { .. } => 503,
            Self::DuplicateHandler { .. }
            | Self::HandlerExecution { .. }
            | Self::SerDes(_)
            | Self::Validation { .. } => 500,
        }
    }

    /// Returns the stable error type string used in error responses.
    pub fn error_type(&self) -> &str {
        match self {
            Self::MalformedRequest { .. } => "MalformedRequest",
            Self::MethodNotAllowed { .. } => "MethodNotAllowed",
            Self::HandlerNotFound { .. } => "HandlerNotFound",
            Self::DuplicateHandler { .. } => "DuplicateHandler",
            Self::StoreUnavailable { .. } => "StoreUnavailable",
            Self::LockTimeout { .. } => "LockTimeout",
            Self::HandlerExecution { .. } => "HandlerExecutionFailure",
            Self::SerDes(_) => "SerDesError",
            Self::Validation { .. } => "ValidationError",
        }
    }

    /// Returns true if this error was caused by the caller rather than the endpoint.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// A failure reported by handler code.
///
/// Handlers return `Result<T, HandlerError>`. Errors raised by the endpoint
/// itself while the handler runs (for example a state read hitting an
/// unavailable store) pass through unchanged, so they keep their own status.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler decided to fail the invocation.
    #[error("{message}")]
    Failure {
        /// Human-readable failure detail
        message: String,
        /// Error type reported to the caller
        error_type: String,
    },

    /// An endpoint error surfaced inside the handler.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

impl HandlerError {
    /// Error type used when the handler does not name one.
    pub const DEFAULT_ERROR_TYPE: &'static str = "HandlerError";

    /// Creates a new failure with the default error type.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            error_type: Self::DEFAULT_ERROR_TYPE.to_string(),
        }
    }

    /// Creates a new failure with an explicit error type.
    pub fn with_type(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            error_type: error_type.into(),
        }
    }
}

impl From<SerDesError> for HandlerError {
    fn from(error: SerDesError) -> Self {
        Self::Endpoint(EndpointError::SerDes(error))
    }
}

impl From<HandlerError> for EndpointError {
    fn from(error: HandlerError) -> Self {
        match error {
            HandlerError::Failure {
                message,
                error_type,
            } => Self::HandlerExecution {
                message,
                error_type,
            },
            HandlerError::Endpoint(inner) => inner,
        }
    }
}

/// Error object serialized into error response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error type/name
    #[serde(rename = "ErrorType")]
    pub error_type: String,
    /// The error message
    #[serde(rename = "ErrorMessage")]
    pub error_message: String,
}

impl ErrorObject {
    /// Creates a new ErrorObject.
    pub fn new(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
        }
    }
}

impl From<&EndpointError> for ErrorObject {
    fn from(error: &EndpointError) -> Self {
        match error {
            // Handler failures report the handler's own type and message.
            EndpointError::HandlerExecution {
                message,
                error_type,
            } => ErrorObject::new(error_type, message),
            other => ErrorObject::new(other.error_type(), other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EndpointError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerDes(SerDesError::from(error))
    }
}

impl From<std::io::Error> for EndpointError {
    fn from(error: std::io::Error) -> Self {
        Self::StoreUnavailable {
            message: error.to_string(),
        }
    }
}
