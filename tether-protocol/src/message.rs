//! Call and reply envelopes.

use crate::error::{ErrorCode, ProtocolError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Call envelope, sent from caller to callee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Correlation id, unique among the sender's outstanding calls.
    pub id: String,

    /// Method name on the callee's function table.
    pub method: String,

    /// Ordered call arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl CallEnvelope {
    pub fn new(id: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            args,
        }
    }
}

/// Serialized description of a failure on the callee side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Stable error code.
    pub code: ErrorCode,

    /// Human-readable error message.
    pub message: String,

    /// Whether the caller may retry.
    pub retryable: bool,

    /// Additional error details.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, Value>,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            retryable: code.is_retryable(),
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn handler_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::HandlerFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns a detail value by key.
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RemoteError {}

impl From<ProtocolError> for RemoteError {
    fn from(err: ProtocolError) -> Self {
        RemoteError::new(err.error_code(), err.to_string())
    }
}

/// Deserializes a present field as `Some`, even when its value is `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Reply envelope, sent from callee back to caller.
///
/// Exactly one of `result` and `error` is present. A `null` result is a
/// present result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Id of the originating call.
    pub id: String,

    /// Return value (for successful calls).
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,

    /// Error description (for failed calls).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl ReplyEnvelope {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, error: RemoteError) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Checks the exactly-one-of invariant.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match (&self.result, &self.error) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(ProtocolError::MalformedEnvelope(format!(
                "reply {} carries both result and error",
                self.id
            ))),
            (None, None) => Err(ProtocolError::MalformedEnvelope(format!(
                "reply {} carries neither result nor error",
                self.id
            ))),
        }
    }

    /// Converts the reply into the caller-facing outcome.
    ///
    /// An error wins if both fields are set.
    pub fn into_outcome(self) -> Result<Value, RemoteError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A decoded inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Call(CallEnvelope),
    Reply(ReplyEnvelope),
}

impl Envelope {
    /// Returns the correlation id of the envelope.
    pub fn id(&self) -> &str {
        match self {
            Envelope::Call(call) => &call.id,
            Envelope::Reply(reply) => &reply.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_serialization() {
        let call = CallEnvelope::new("1", "prompt", vec![json!("hello")]);
        let json = serde_json::to_string(&call).unwrap();
        assert!(json.contains(r#""method":"prompt""#));
        assert!(json.contains(r#""args":["hello"]"#));
    }

    #[test]
    fn test_call_without_args_defaults_empty() {
        let call: CallEnvelope = serde_json::from_str(r#"{"id":"7","method":"getModels"}"#).unwrap();
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_reply_ok_serialization() {
        let reply = ReplyEnvelope::ok("1", json!({"theme": "dark"}));
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains(r#""result":{"theme":"dark"}"#));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_reply_null_result_is_present() {
        let reply = ReplyEnvelope::ok("3", Value::Null);
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"id":"3","result":null}"#);

        let parsed: ReplyEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.result, Some(Value::Null));
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.into_outcome().unwrap(), Value::Null);
    }

    #[test]
    fn test_reply_error_serialization() {
        let err = RemoteError::not_found("Model with id m-1 not found").with_detail("id", "m-1");
        let reply = ReplyEnvelope::error("1", err);
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains(r#""code":"NOT_FOUND""#));
        assert!(json.contains(r#""retryable":false"#));
        assert!(!json.contains("result"));
    }

    #[test]
    fn test_reply_validation() {
        let both = ReplyEnvelope {
            id: "1".into(),
            result: Some(json!(1)),
            error: Some(RemoteError::internal("x")),
        };
        assert!(both.validate().is_err());
        assert!(both.into_outcome().is_err());

        let neither: ReplyEnvelope = serde_json::from_str(r#"{"id":"2"}"#).unwrap();
        assert!(neither.validate().is_err());
    }

    #[test]
    fn test_remote_error_from_protocol_error() {
        let err: RemoteError = ProtocolError::UnknownMethod("fly".into()).into();
        assert_eq!(err.code, ErrorCode::UnknownMethod);
        assert!(err.message.contains("fly"));
        assert_eq!(err.to_string(), "UNKNOWN_METHOD: unknown method: fly");
    }
}
