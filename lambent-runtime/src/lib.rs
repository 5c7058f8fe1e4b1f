//! Client-side implementation of the Lambda invocation protocol.
//!
//! Polls the Runtime API for work, runs a registered handler under the
//! invocation deadline, and reports each outcome back over the same
//! protocol.

pub mod client;
pub mod context;
pub mod handler;
pub mod registry;
pub mod runtime;

pub use client::{Invocation, RuntimeApiClient, RuntimeApiError};
pub use context::{Context, FunctionMeta};
pub use handler::{handler_fn, FnHandler, Handler};
pub use registry::{HandlerModule, HandlerRegistry, ResolveError};
pub use runtime::{InvocationOutcome, Runtime, RuntimeError};
