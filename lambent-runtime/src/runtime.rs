//! The invocation loop
//!
//! Receive, execute under the deadline, report, repeat. Handler faults,
//! panics and timeouts are reported per invocation and the loop keeps
//! serving; configuration and protocol failures end the process, and the
//! host replaces the environment.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lambent_core::{ErrorEnvelope, ErrorKind, Fault};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{info, info_span, warn, Instrument};

use crate::client::{Invocation, RuntimeApiClient, RuntimeApiError};
use crate::context::{Context, FunctionMeta};
use crate::handler::Handler;

/// Window applied when the host sends no deadline.
const DEFAULT_DEADLINE_MS: i64 = 60_000;

/// Fatal failures of the loop. None of these are reported per invocation;
/// the process exits and the host starts over.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Api(#[from] RuntimeApiError),

    #[error("invocation {request_id} carries a malformed JSON event: {source}")]
    MalformedEvent {
        request_id: String,
        source: serde_json::Error,
    },

    #[error("failed to serialize response for invocation {request_id}: {source}")]
    SerializeResponse {
        request_id: String,
        source: serde_json::Error,
    },
}

/// How one invocation settled.
#[derive(Debug)]
pub enum InvocationOutcome {
    Success(Value),
    /// The budget ran out first. Carries the budget that was exceeded.
    Timeout(Duration),
    Failure(Fault),
}

/// The runtime: a resolved handler capability plus the Runtime API client.
pub struct Runtime {
    client: RuntimeApiClient,
    handler: Arc<dyn Handler>,
    function: FunctionMeta,
}

impl Runtime {
    pub fn new(
        client: RuntimeApiClient,
        handler: Arc<dyn Handler>,
        function: FunctionMeta,
    ) -> Self {
        Self {
            client,
            handler,
            function,
        }
    }

    /// Serve invocations until a fatal error.
    ///
    /// Never returns `Ok`: per-invocation failures are reported to the
    /// host and the loop polls again immediately.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        info!(function = %self.function.function_name, "Runtime started");
        loop {
            let invocation = self.client.next_invocation().await?;
            self.serve(invocation).await?;
        }
    }

    async fn serve(&self, invocation: Invocation) -> Result<(), RuntimeError> {
        // A payload that is not valid JSON violates the protocol: nothing
        // is reported and the environment is torn down.
        let event: Value = match serde_json::from_slice(&invocation.payload) {
            Ok(event) => event,
            Err(source) => {
                return Err(RuntimeError::MalformedEvent {
                    request_id: invocation.request_id,
                    source,
                })
            }
        };

        let outcome = self.execute(&invocation, event).await;
        let request_id = invocation.request_id.as_str();

        match outcome {
            InvocationOutcome::Success(value) => {
                let body = response_body(request_id, value)?;
                self.client.send_response(request_id, body).await?;
                info!(request_id = %request_id, "Invocation completed");
            }
            InvocationOutcome::Timeout(budget) => {
                let envelope = ErrorEnvelope::new(
                    ErrorKind::Timeout,
                    format!("invocation timed out after {}ms", budget.as_millis()),
                );
                warn!(
                    request_id = %request_id,
                    budget_ms = budget.as_millis() as u64,
                    "Invocation timed out"
                );
                self.client.send_invocation_error(request_id, &envelope).await?;
            }
            InvocationOutcome::Failure(fault) => {
                let envelope = ErrorEnvelope::classify(fault);
                warn!(
                    request_id = %request_id,
                    error_type = %envelope.error_type(),
                    "Invocation failed"
                );
                self.client.send_invocation_error(request_id, &envelope).await?;
            }
        }

        Ok(())
    }

    /// Race the handler against the invocation budget.
    ///
    /// First to settle wins. A handler that loses the race is abandoned,
    /// never aborted: it may run to completion in the background while its
    /// result is discarded, and the loop is already polling for the next
    /// invocation. A panic inside the handler surfaces here as a join
    /// error and settles the race like any other failure.
    async fn execute(&self, invocation: &Invocation, event: Value) -> InvocationOutcome {
        let now = Utc::now().timestamp_millis();
        let deadline_ms = invocation.deadline_ms.unwrap_or(now + DEFAULT_DEADLINE_MS);
        let budget = budget_from(deadline_ms, now);

        let ctx = Context::new(invocation, deadline_ms, self.function.clone());
        let span = info_span!(
            "invocation",
            request_id = %ctx.request_id,
            trace_id = %ctx.trace_id
        );

        let handler = self.handler.clone();
        let mut task =
            tokio::spawn(async move { handler.invoke(ctx, event).await }.instrument(span));

        tokio::select! {
            result = &mut task => match result {
                Ok(Ok(value)) => InvocationOutcome::Success(value),
                Ok(Err(fault)) => InvocationOutcome::Failure(fault),
                Err(join_error) => InvocationOutcome::Failure(panic_fault(join_error)),
            },
            _ = tokio::time::sleep(budget) => InvocationOutcome::Timeout(budget),
        }
    }
}

/// Remaining budget before an absolute deadline, clamped to one
/// millisecond so an already-expired deadline still yields a race.
fn budget_from(deadline_ms: i64, now_ms: i64) -> Duration {
    Duration::from_millis((deadline_ms - now_ms).max(1) as u64)
}

/// Render a joined task's panic as a fault value.
fn panic_fault(err: JoinError) -> Fault {
    let message = match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "handler panicked".to_string()
            }
        }
        Err(err) => err.to_string(),
    };
    Fault::Other(Value::String(message))
}

/// Encode the success value for the response body. Null sends an empty
/// body, strings pass through verbatim, everything else is JSON.
fn response_body(request_id: &str, value: Value) -> Result<String, RuntimeError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        other => serde_json::to_string(&other).map_err(|source| RuntimeError::SerializeResponse {
            request_id: request_id.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_budget_counts_down_from_the_deadline() {
        assert_eq!(budget_from(10_500, 10_000), Duration::from_millis(500));
    }

    #[test]
    fn test_budget_clamps_to_one_millisecond() {
        assert_eq!(budget_from(10_000, 10_000), Duration::from_millis(1));
        assert_eq!(budget_from(9_000, 10_000), Duration::from_millis(1));
    }

    #[test]
    fn test_null_response_is_an_empty_body() {
        assert_eq!(response_body("req-1", Value::Null).unwrap(), "");
    }

    #[test]
    fn test_string_response_passes_through_verbatim() {
        let body = response_body("req-1", json!("plain text")).unwrap();
        assert_eq!(body, "plain text");
    }

    #[test]
    fn test_value_response_is_json_encoded() {
        let body = response_body("req-1", json!({ "answer": 42 })).unwrap();
        assert_eq!(body, r#"{"answer":42}"#);
    }

    #[tokio::test]
    async fn test_panic_fault_carries_the_panic_message() {
        let handle = tokio::spawn(async { panic!("kaboom") });
        let join_error = handle.await.unwrap_err();
        match panic_fault(join_error) {
            Fault::Other(Value::String(message)) => assert_eq!(message, "kaboom"),
            other => panic!("expected string fault, got {other:?}"),
        }
    }
}
