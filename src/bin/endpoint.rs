//! Lambda entry point hosting the example Greeter services.
//!
//! Configuration comes from the environment, see
//! [`EndpointConfig::from_env`](durable_object_endpoint::EndpointConfig::from_env).

use durable_object_endpoint::{lambda, services, EndpointConfig, InvocationRouter};
use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::tracing::init_default_subscriber();

    let config = EndpointConfig::from_env()?;
    let registry = services::default_registry()?;
    let router = InvocationRouter::from_config(registry, config)?;
    tracing::info!(
        handlers = router.registry().len(),
        store = ?router.config().store,
        "Durable object endpoint ready"
    );

    let router = &router;
    lambda_runtime::run(lambda_runtime::service_fn(move |event| {
        lambda::handle_event(router, event)
    }))
    .await
}
