//! Per-invocation execution context

use chrono::Utc;
use lambent_core::RuntimeConfig;

use crate::client::Invocation;

/// Static function metadata, resolved once at cold start.
#[derive(Debug, Clone)]
pub struct FunctionMeta {
    pub function_name: String,
    pub function_version: String,
    pub memory_limit_in_mb: i32,
}

impl From<&RuntimeConfig> for FunctionMeta {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            function_name: config.function_name.clone(),
            function_version: config.function_version.clone(),
            memory_limit_in_mb: config.memory_limit_in_mb,
        }
    }
}

/// Context passed to the handler for a single invocation.
///
/// Built right before the handler runs and dropped once the invocation is
/// reported, on every exit path. The trace id lives here and on the
/// invocation span, never in ambient process state.
#[derive(Debug, Clone)]
pub struct Context {
    pub request_id: String,
    pub trace_id: String,
    /// Absolute deadline in epoch milliseconds. Defaulted by the loop when
    /// the host sent none.
    pub deadline_ms: i64,
    pub invoked_function_arn: Option<String>,
    pub function: FunctionMeta,
}

impl Context {
    pub fn new(invocation: &Invocation, deadline_ms: i64, function: FunctionMeta) -> Self {
        Self {
            request_id: invocation.request_id.clone(),
            trace_id: invocation.trace_id.clone(),
            deadline_ms,
            invoked_function_arn: invocation.invoked_function_arn.clone(),
            function,
        }
    }

    /// Get remaining time in milliseconds
    pub fn get_remaining_time_in_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        (self.deadline_ms - now).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn test_meta() -> FunctionMeta {
        FunctionMeta {
            function_name: "test-function".to_string(),
            function_version: "$LATEST".to_string(),
            memory_limit_in_mb: 128,
        }
    }

    #[test]
    fn test_context_copies_invocation_fields() {
        let invocation = Invocation {
            request_id: "req-1".to_string(),
            trace_id: "Root=1-abc".to_string(),
            deadline_ms: None,
            invoked_function_arn: Some(
                "arn:aws:lambda:us-east-1:000000000000:function:test".to_string(),
            ),
            payload: Bytes::from_static(b"{}"),
        };
        let deadline = Utc::now().timestamp_millis() + 60_000;
        let ctx = Context::new(&invocation, deadline, test_meta());
        assert_eq!(ctx.request_id, "req-1");
        assert_eq!(ctx.trace_id, "Root=1-abc");
        assert_eq!(ctx.deadline_ms, deadline);
        assert_eq!(ctx.function.function_name, "test-function");
    }

    #[test]
    fn test_remaining_time_counts_down_to_the_deadline() {
        let invocation = Invocation {
            request_id: "req-2".to_string(),
            trace_id: "Root=1-def".to_string(),
            deadline_ms: None,
            invoked_function_arn: None,
            payload: Bytes::from_static(b"{}"),
        };
        let deadline = Utc::now().timestamp_millis() + 5_000;
        let ctx = Context::new(&invocation, deadline, test_meta());
        let remaining = ctx.get_remaining_time_in_millis();
        assert!(remaining > 0);
        assert!(remaining <= 5_000);
    }

    #[test]
    fn test_remaining_time_clamps_at_zero() {
        let invocation = Invocation {
            request_id: "req-3".to_string(),
            trace_id: "Root=1-ghi".to_string(),
            deadline_ms: None,
            invoked_function_arn: None,
            payload: Bytes::from_static(b"{}"),
        };
        let deadline = Utc::now().timestamp_millis() - 1_000;
        let ctx = Context::new(&invocation, deadline, test_meta());
        assert_eq!(ctx.get_remaining_time_in_millis(), 0);
    }
}
