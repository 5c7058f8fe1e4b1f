//! Built-in handler modules
//!
//! A deployment embeds its own modules the same way these are registered;
//! the stock binary ships a small set that keeps it deployable and
//! diagnosable out of the box.

use lambent_core::Fault;
use lambent_runtime::{handler_fn, Context, HandlerModule, HandlerRegistry};
use serde_json::{json, Value};

/// Handler modules available to `_HANDLER` resolution.
pub fn registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .module("app", || {
            Ok(HandlerModule::new().default_export(handler_fn(echo)))
        })
        .module("diagnostics", || {
            Ok(HandlerModule::new()
                .export("environment", handler_fn(environment))
                .export_value(
                    "build",
                    json!({
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    }),
                ))
        })
}

/// Echo the event back unchanged.
async fn echo(_ctx: Context, event: Value) -> Result<Value, Fault> {
    Ok(event)
}

/// Report function metadata and the remaining budget.
async fn environment(ctx: Context, _event: Value) -> Result<Value, Fault> {
    Ok(json!({
        "functionName": ctx.function.function_name,
        "functionVersion": ctx.function.function_version,
        "memoryLimitInMb": ctx.function.memory_limit_in_mb,
        "remainingTimeInMillis": ctx.get_remaining_time_in_millis(),
        "requestId": ctx.request_id,
        "traceId": ctx.trace_id,
    }))
}
