//! Failure values a handler invocation can produce.
//!
//! A handler that does not return a value settles with a [`Fault`]. Faults
//! are per-invocation: they are reported to the host and the runtime moves
//! on to the next invocation.

use std::backtrace::Backtrace;

use serde_json::Value;
use thiserror::Error;

/// A named, native handler failure.
///
/// Carries the stack captured where it was constructed. This is the only
/// fault shape that keeps a stack trace.
#[derive(Debug, Error)]
#[error("{name}: {message}")]
pub struct HandlerError {
    pub name: String,
    pub message: String,
    pub stack: Option<Vec<String>>,
}

impl HandlerError {
    /// A failure under the generic `Error` name.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    /// A failure reported under its own name.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        let stack = Backtrace::force_capture().to_string();
        Self {
            name: name.into(),
            message: message.into(),
            stack: Some(stack.lines().map(str::to_owned).collect()),
        }
    }
}

/// What a handler invocation settled with instead of a value.
#[derive(Debug)]
pub enum Fault {
    /// A named failure with a message and a captured stack.
    Native(HandlerError),
    /// An explicit kind plus an arbitrary cause value. No stack.
    Structured { kind: String, cause: Value },
    /// Anything else. Reported as `UnknownError`.
    Other(Value),
}

impl Fault {
    /// Native failure under the generic `Error` name.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Native(HandlerError::new(message))
    }

    /// Native failure under its own name.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Native(HandlerError::named(name, message))
    }

    /// Structured failure with an explicit kind and cause value.
    pub fn structured(kind: impl Into<String>, cause: Value) -> Self {
        Self::Structured {
            kind: kind.into(),
            cause,
        }
    }
}

impl From<HandlerError> for Fault {
    fn from(err: HandlerError) -> Self {
        Self::Native(err)
    }
}

impl From<anyhow::Error> for Fault {
    fn from(err: anyhow::Error) -> Self {
        Self::Native(HandlerError::new(format!("{err:#}")))
    }
}

impl From<serde_json::Error> for Fault {
    fn from(err: serde_json::Error) -> Self {
        Self::Native(HandlerError::named("SerializationError", err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use serde_json::json;

    #[test]
    fn test_new_captures_a_stack() {
        let err = HandlerError::new("boom");
        assert_eq!(err.name, "Error");
        assert_eq!(err.message, "boom");
        let stack = err.stack.unwrap();
        assert!(!stack.is_empty());
    }

    #[test]
    fn test_named_keeps_the_name() {
        let err = HandlerError::named("PaymentDeclined", "card expired");
        assert_eq!(err.name, "PaymentDeclined");
        assert_eq!(err.to_string(), "PaymentDeclined: card expired");
    }

    #[test]
    fn test_anyhow_chain_is_rendered() {
        let cause: anyhow::Result<()> = Err(anyhow::anyhow!("connection refused"));
        let err = cause.context("fetching profile").unwrap_err();
        let fault = Fault::from(err);
        match fault {
            Fault::Native(err) => {
                assert_eq!(err.name, "Error");
                assert_eq!(err.message, "fetching profile: connection refused");
            }
            other => panic!("expected native fault, got {other:?}"),
        }
    }

    #[test]
    fn test_structured_keeps_kind_and_cause() {
        let fault = Fault::structured("ValidationError", json!({ "field": "email" }));
        match fault {
            Fault::Structured { kind, cause } => {
                assert_eq!(kind, "ValidationError");
                assert_eq!(cause, json!({ "field": "email" }));
            }
            other => panic!("expected structured fault, got {other:?}"),
        }
    }
}
