//! Core types for the Lambent runtime.
//!
//! Shared between the invocation loop, the bootstrap binary, and tests:
//! environment configuration, handler fault values, and the canonical
//! error envelope reported to the Runtime API.

pub mod config;
pub mod envelope;
pub mod fault;

pub use config::{ConfigError, RuntimeConfig};
pub use envelope::{ErrorEnvelope, ErrorKind};
pub use fault::{Fault, HandlerError};
