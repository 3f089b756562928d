//! Example virtual objects.
//!
//! - `Greeter.greet` counts how often each object key was greeted.
//! - `GreeterObject.greet` does the same under its own state entry, and
//!   `GreeterObject.ungreet` takes one greeting back without going below zero.

use crate::context::ObjectContext;
use crate::error::{EndpointError, HandlerError};
use crate::registry::{HandlerRegistry, ServiceDefinition};
use crate::serdes::StateKey;

pub const GREETER: &str = "Greeter";
pub const GREETER_OBJECT: &str = "GreeterObject";

/// Greeting count kept by `Greeter`.
pub const GREETER_COUNT: StateKey<u32> = StateKey::new("counter");
/// Greeting count kept by `GreeterObject`.
pub const GREETER_OBJECT_COUNT: StateKey<u32> = StateKey::new("available-drivers");

async fn increment_and_greet(
    ctx: &ObjectContext,
    key: &StateKey<u32>,
    greeting: &str,
) -> Result<String, HandlerError> {
    let count = ctx.get_as(key).await?.unwrap_or(0);
    let new_count = count
        .checked_add(1)
        .ok_or_else(|| HandlerError::with_type("CounterOverflow", "greeting counter overflowed"))?;
    ctx.set_as(key, &new_count)?;

    Ok(format!(
        "{} {}, for the {}-th time",
        greeting,
        ctx.key(),
        new_count
    ))
}

/// Greets the object and bumps its `counter`.
pub async fn greet(ctx: ObjectContext, greeting: String) -> Result<String, HandlerError> {
    increment_and_greet(&ctx, &GREETER_COUNT, &greeting).await
}

/// Greets the object and bumps its `available-drivers` count.
pub async fn object_greet(ctx: ObjectContext, greeting: String) -> Result<String, HandlerError> {
    increment_and_greet(&ctx, &GREETER_OBJECT_COUNT, &greeting).await
}

/// Takes one greeting back. The count never drops below zero; the reply
/// reports the count as it was before.
pub async fn ungreet(ctx: ObjectContext, _: ()) -> Result<String, HandlerError> {
    let count = ctx.get_as(&GREETER_OBJECT_COUNT).await?.unwrap_or(0);
    if count > 0 {
        ctx.set_as(&GREETER_OBJECT_COUNT, &(count - 1))?;
    }

    Ok(format!(
        "Dear {}, taking one greeting back: {}",
        ctx.key(),
        count
    ))
}

pub fn greeter() -> ServiceDefinition {
    ServiceDefinition::new(GREETER).handler("greet", greet)
}

pub fn greeter_object() -> ServiceDefinition {
    ServiceDefinition::new(GREETER_OBJECT)
        .handler("greet", object_greet)
        .handler("ungreet", ungreet)
}

/// A registry holding both example services.
pub fn default_registry() -> Result<HandlerRegistry, EndpointError> {
    let mut registry = HandlerRegistry::new();
    registry.register_service(greeter())?;
    registry.register_service(greeter_object())?;
    Ok(registry)
}
