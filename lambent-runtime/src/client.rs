//! Runtime API client
//!
//! Speaks the client side of the Lambda Runtime API: fetch the next
//! invocation, send a response, report an invocation error, report an
//! init error. The host owns environment lifecycle, so there is no retry
//! discipline here; any failed wire call is fatal to the process.

use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::debug;

use lambent_core::ErrorEnvelope;

/// Versioned path prefix of the Runtime API.
const API_VERSION: &str = "2018-06-01";

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_ERROR: &str = "application/vnd.aws.lambda.error+json";

/// Request id of the delivered invocation. Required.
pub const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";
/// Trace id propagated to the handler. Required.
pub const TRACE_ID_HEADER: &str = "Lambda-Runtime-Trace-Id";
/// Absolute invocation deadline in epoch milliseconds. Optional.
pub const DEADLINE_MS_HEADER: &str = "Lambda-Runtime-Deadline-Ms";
/// ARN the function was invoked under. Optional.
pub const FUNCTION_ARN_HEADER: &str = "Lambda-Runtime-Invoked-Function-Arn";
/// Tags an error report with its error type.
pub const ERROR_TYPE_HEADER: &str = "Lambda-Runtime-Function-Error-Type";

/// Errors from the Runtime API. All of them terminate the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeApiError {
    #[error("runtime API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{operation} returned unexpected status {status}")]
    UnexpectedStatus {
        operation: &'static str,
        status: StatusCode,
    },

    #[error("invocation is missing required header {0}")]
    MissingHeader(&'static str),
}

/// One unit of work delivered by the host.
#[derive(Debug)]
pub struct Invocation {
    pub request_id: String,
    pub trace_id: String,
    /// Absolute deadline in epoch milliseconds, if the host sent one.
    pub deadline_ms: Option<i64>,
    pub invoked_function_arn: Option<String>,
    /// Raw event payload, not yet parsed.
    pub payload: Bytes,
}

/// Client for the four Runtime API operations.
pub struct RuntimeApiClient {
    base_url: String,
    client: Client,
}

impl RuntimeApiClient {
    /// Create a client for the given `host:port` endpoint.
    ///
    /// The client carries no request timeout: the next-invocation call
    /// parks until the host has work for us.
    pub fn new(endpoint: &str) -> Result<Self, RuntimeApiError> {
        let client = Client::builder().build()?;
        Ok(Self {
            base_url: base_url(endpoint),
            client,
        })
    }

    /// GET /runtime/invocation/next
    ///
    /// Blocks until the host delivers an invocation.
    pub async fn next_invocation(&self) -> Result<Invocation, RuntimeApiError> {
        let url = format!("{}/invocation/next", self.base_url);
        let response = self.client.get(&url).send().await?;
        check_status("next invocation", response.status())?;

        let (request_id, trace_id, deadline_ms, invoked_function_arn) = {
            let headers = response.headers();
            (
                required_header(headers, REQUEST_ID_HEADER)?,
                required_header(headers, TRACE_ID_HEADER)?,
                headers
                    .get(DEADLINE_MS_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<i64>().ok()),
                headers
                    .get(FUNCTION_ARN_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned),
            )
        };

        let payload = response.bytes().await?;
        debug!(request_id = %request_id, bytes = payload.len(), "Received invocation");

        Ok(Invocation {
            request_id,
            trace_id,
            deadline_ms,
            invoked_function_arn,
            payload,
        })
    }

    /// POST /runtime/invocation/{requestId}/response
    pub async fn send_response(
        &self,
        request_id: &str,
        body: String,
    ) -> Result<(), RuntimeApiError> {
        let url = format!("{}/invocation/{}/response", self.base_url, request_id);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await?;

        debug!(request_id = %request_id, "Sent invocation response");
        check_status("send response", response.status())
    }

    /// POST /runtime/invocation/{requestId}/error
    pub async fn send_invocation_error(
        &self,
        request_id: &str,
        envelope: &ErrorEnvelope,
    ) -> Result<(), RuntimeApiError> {
        let url = format!("{}/invocation/{}/error", self.base_url, request_id);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, CONTENT_TYPE_ERROR)
            .header(ERROR_TYPE_HEADER, envelope.error_type())
            .body(envelope.to_json())
            .send()
            .await?;

        debug!(
            request_id = %request_id,
            error_type = %envelope.error_type(),
            "Sent invocation error"
        );
        check_status("send invocation error", response.status())
    }

    /// POST /runtime/init/error
    ///
    /// Reports a cold-start failure. The process is expected to exit right
    /// after this call.
    pub async fn send_init_error(&self, envelope: &ErrorEnvelope) -> Result<(), RuntimeApiError> {
        let url = format!("{}/init/error", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, CONTENT_TYPE_ERROR)
            .header(ERROR_TYPE_HEADER, envelope.error_type())
            .body(envelope.to_json())
            .send()
            .await?;

        debug!(error_type = %envelope.error_type(), "Sent init error");
        check_status("send init error", response.status())
    }
}

fn base_url(endpoint: &str) -> String {
    format!("http://{}/{}/runtime", endpoint, API_VERSION)
}

fn check_status(operation: &'static str, status: StatusCode) -> Result<(), RuntimeApiError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(RuntimeApiError::UnexpectedStatus { operation, status })
    }
}

fn required_header(headers: &HeaderMap, name: &'static str) -> Result<String, RuntimeApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .filter(|v| !v.is_empty())
        .ok_or(RuntimeApiError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_base_url_carries_api_version() {
        assert_eq!(
            base_url("127.0.0.1:9001"),
            "http://127.0.0.1:9001/2018-06-01/runtime"
        );
    }

    #[test]
    fn test_required_header_present() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-1"));
        assert_eq!(required_header(&headers, REQUEST_ID_HEADER).unwrap(), "req-1");
    }

    #[test]
    fn test_required_header_missing() {
        let headers = HeaderMap::new();
        let err = required_header(&headers, TRACE_ID_HEADER).unwrap_err();
        match err {
            RuntimeApiError::MissingHeader(name) => assert_eq!(name, TRACE_ID_HEADER),
            other => panic!("expected missing header error, got {other:?}"),
        }
    }

    #[test]
    fn test_required_header_empty_counts_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(TRACE_ID_HEADER, HeaderValue::from_static(""));
        assert!(required_header(&headers, TRACE_ID_HEADER).is_err());
    }

    #[test]
    fn test_check_status_rejects_non_success() {
        assert!(check_status("next invocation", StatusCode::OK).is_ok());
        assert!(check_status("next invocation", StatusCode::ACCEPTED).is_ok());
        let err = check_status("next invocation", StatusCode::INTERNAL_SERVER_ERROR).unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
