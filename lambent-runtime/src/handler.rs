//! Handler contract
//!
//! One capability per process: resolved once at cold start, then invoked
//! for every event the host delivers.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use lambent_core::Fault;
use serde_json::Value;

use crate::context::Context;

/// A resolved handler capability.
///
/// The success value may be null, a string, or any other JSON value; the
/// loop encodes each shape differently on the wire. A [`Fault`] is
/// reported as a per-invocation error and the loop keeps serving.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(&self, ctx: Context, event: Value) -> Result<Value, Fault>;
}

/// Handlers are opaque capabilities; the output names the contract only.
impl fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<handler>")
    }
}

/// Adapt an async function into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Context, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, Fault>> + Send,
{
    FnHandler { f }
}

/// [`Handler`] backed by a plain async function.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Context, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, Fault>> + Send,
{
    async fn invoke(&self, ctx: Context, event: Value) -> Result<Value, Fault> {
        (self.f)(ctx, event).await
    }
}
