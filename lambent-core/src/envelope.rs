//! Error classification and wire formatting.
//!
//! Every failure reported to the Runtime API is normalized into an
//! [`ErrorEnvelope`] exactly once, at the reporting boundary.

use serde::Serialize;
use serde_json::Value;

use crate::fault::{Fault, HandlerError};

/// Classification of a reported failure.
///
/// The set is closed. Native handler failures pass through under their own
/// name via [`ErrorKind::Handler`]; everything else maps to one of the
/// fixed kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required configuration is missing or malformed.
    Config,
    /// The configured handler module is not registered.
    FileDoesNotExist,
    /// A module initializer failed at cold start.
    Init,
    /// The module has neither a default export nor the named export.
    MethodDoesNotExist,
    /// The named export exists but is not callable.
    MethodIsNotAFunction,
    /// The invocation ran out of its time budget.
    Timeout,
    /// A failure value that fits no other classification.
    Unknown,
    /// A native handler failure, reported under its own name.
    Handler(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Config => "ConfigError",
            Self::FileDoesNotExist => "FileDoesNotExist",
            Self::Init => "InitError",
            Self::MethodDoesNotExist => "MethodDoesNotExist",
            Self::MethodIsNotAFunction => "MethodIsNotAFunction",
            Self::Timeout => "TimeoutError",
            Self::Unknown => "UnknownError",
            Self::Handler(name) => name,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical error shape reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    pub stack_trace: Option<Vec<String>>,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn with_stack_trace(mut self, lines: Vec<String>) -> Self {
        self.stack_trace = Some(lines);
        self
    }

    /// Normalize a handler fault into its reportable envelope.
    ///
    /// Native failures keep their name and stack. Structured failures keep
    /// their kind, with the cause rendered as the message. Everything else
    /// is reported as `UnknownError`.
    pub fn classify(fault: Fault) -> Self {
        match fault {
            Fault::Native(HandlerError {
                name,
                message,
                stack,
            }) => Self {
                kind: ErrorKind::Handler(name),
                message,
                stack_trace: stack,
            },
            Fault::Structured { kind, cause } => Self {
                kind: ErrorKind::Handler(kind),
                message: render_value(&cause),
                stack_trace: None,
            },
            Fault::Other(value) => Self {
                kind: ErrorKind::Unknown,
                message: render_value(&value),
                stack_trace: None,
            },
        }
    }

    /// Wire name of the error kind, also sent as the error-type header.
    pub fn error_type(&self) -> &str {
        self.kind.as_str()
    }

    /// Format as the Runtime API error body.
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct JsonError<'a> {
            error_type: &'a str,
            error_message: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            stack_trace: Option<&'a [String]>,
        }

        let error = JsonError {
            error_type: self.kind.as_str(),
            error_message: &self.message,
            stack_trace: self.stack_trace.as_deref(),
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(
                r#"{{"errorType":"{}","errorMessage":"{}"}}"#,
                self.kind.as_str(),
                self.message
            )
        })
    }
}

/// Strings render verbatim; any other value renders as compact JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(ErrorKind::Config.as_str(), "ConfigError");
        assert_eq!(ErrorKind::FileDoesNotExist.as_str(), "FileDoesNotExist");
        assert_eq!(ErrorKind::Init.as_str(), "InitError");
        assert_eq!(ErrorKind::MethodDoesNotExist.as_str(), "MethodDoesNotExist");
        assert_eq!(
            ErrorKind::MethodIsNotAFunction.as_str(),
            "MethodIsNotAFunction"
        );
        assert_eq!(ErrorKind::Timeout.as_str(), "TimeoutError");
        assert_eq!(ErrorKind::Unknown.as_str(), "UnknownError");
        assert_eq!(
            ErrorKind::Handler("PaymentDeclined".to_string()).as_str(),
            "PaymentDeclined"
        );
    }

    #[test]
    fn test_classify_native_keeps_name_and_stack() {
        let envelope = ErrorEnvelope::classify(Fault::named("PaymentDeclined", "card expired"));
        assert_eq!(envelope.error_type(), "PaymentDeclined");
        assert_eq!(envelope.message, "card expired");
        assert!(!envelope.stack_trace.unwrap().is_empty());
    }

    #[test]
    fn test_classify_structured_renders_cause() {
        let envelope = ErrorEnvelope::classify(Fault::structured(
            "ValidationError",
            json!({ "field": "email" }),
        ));
        assert_eq!(envelope.error_type(), "ValidationError");
        assert_eq!(envelope.message, r#"{"field":"email"}"#);
        assert!(envelope.stack_trace.is_none());
    }

    #[test]
    fn test_classify_other_string_is_unknown() {
        let envelope = ErrorEnvelope::classify(Fault::Other(json!("something broke")));
        assert_eq!(envelope.error_type(), "UnknownError");
        assert_eq!(envelope.message, "something broke");
        assert!(envelope.stack_trace.is_none());
    }

    #[test]
    fn test_classify_other_value_is_rendered_as_json() {
        let envelope = ErrorEnvelope::classify(Fault::Other(json!(42)));
        assert_eq!(envelope.error_type(), "UnknownError");
        assert_eq!(envelope.message, "42");
    }

    #[test]
    fn test_json_format_includes_stack() {
        let envelope = ErrorEnvelope::classify(Fault::error("boom"));
        let json = envelope.to_json();
        assert!(json.contains(r#""errorType":"Error""#));
        assert!(json.contains(r#""errorMessage":"boom""#));
        assert!(json.contains(r#""stackTrace":["#));
    }

    #[test]
    fn test_json_format_omits_missing_stack() {
        let envelope = ErrorEnvelope::new(ErrorKind::Timeout, "invocation timed out after 300ms");
        let json = envelope.to_json();
        assert!(json.contains(r#""errorType":"TimeoutError""#));
        assert!(!json.contains("stackTrace"));
    }
}
