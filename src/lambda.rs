//! AWS Lambda host binding.
//!
//! Translates API Gateway proxy events into [`RequestEnvelope`]s, routes them,
//! and translates the [`ResponseEnvelope`] back. Register it with
//! `lambda_runtime`:
//!
//! ```rust,ignore
//! use durable_object_endpoint::{lambda, services, EndpointConfig, InvocationRouter};
//! use lambda_runtime::{service_fn, Error, LambdaEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let router = InvocationRouter::from_config(
//!         services::default_registry()?,
//!         EndpointConfig::from_env()?,
//!     )?;
//!     let router = &router;
//!     lambda_runtime::run(service_fn(move |event| lambda::handle_event(router, event))).await
//! }
//! ```

use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use aws_lambda_events::encodings::Body;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use lambda_runtime::LambdaEvent;

use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::EndpointError;
use crate::router::InvocationRouter;

/// Handles one API Gateway proxy event.
///
/// Envelope problems become error responses, so this only fails if the
/// response itself cannot be built.
pub async fn handle_event(
    router: &InvocationRouter,
    event: LambdaEvent<ApiGatewayProxyRequest>,
) -> Result<ApiGatewayProxyResponse, lambda_runtime::Error> {
    let (request, context) = event.into_parts();
    let request_id = context.request_id;

    let response = match request_from_event(request) {
        Ok(envelope) => {
            tracing::debug!(
                request_id = %request_id,
                method = %envelope.method,
                path = %envelope.path,
                "Received request"
            );
            router.route(envelope).await
        }
        Err(error) => {
            tracing::warn!(request_id = %request_id, error = %error, "Rejected event");
            ResponseEnvelope::from_error(&error)
        }
    };

    tracing::debug!(request_id = %request_id, status = response.status, "Sending response");
    response_to_event(response)
}

/// Converts an API Gateway proxy request into a [`RequestEnvelope`].
pub fn request_from_event(event: ApiGatewayProxyRequest) -> Result<RequestEnvelope, EndpointError> {
    let path = event.path.unwrap_or_else(|| "/".to_string());
    let mut envelope = RequestEnvelope::new(event.http_method.as_str(), path);

    for (name, value) in event.headers.iter() {
        let value = value.to_str().map_err(|_| {
            EndpointError::malformed(format!("header '{}' is not valid text", name))
        })?;
        envelope = envelope.with_header(name.as_str(), value);
    }

    let body = match event.body {
        Some(body) if event.is_base64_encoded => STANDARD
            .decode(body.as_bytes())
            .map(Bytes::from)
            .map_err(|e| EndpointError::malformed(format!("body is not valid base64: {}", e)))?,
        Some(body) => Bytes::from(body),
        None => Bytes::new(),
    };

    Ok(envelope.with_body(body))
}

/// Converts a [`ResponseEnvelope`] into an API Gateway proxy response.
///
/// UTF-8 bodies are sent as text, anything else base64-encoded.
pub fn response_to_event(
    response: ResponseEnvelope,
) -> Result<ApiGatewayProxyResponse, lambda_runtime::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_str(&response.content_type)?);
    for (name, value) in &response.headers {
        headers.insert(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }

    let (body, is_base64_encoded) = if response.body.is_empty() {
        (None, false)
    } else {
        match std::str::from_utf8(&response.body) {
            Ok(text) => (Some(Body::Text(text.to_string())), false),
            Err(_) => (Some(Body::Text(STANDARD.encode(&response.body))), true),
        }
    };

    let mut event = ApiGatewayProxyResponse::default();
    event.status_code = i64::from(response.status);
    event.headers = headers;
    event.body = body;
    event.is_base64_encoded = is_base64_encoded;
    Ok(event)
}
