//! JSON codec for envelopes, arguments and results.

use crate::error::ProtocolError;
use crate::message::{CallEnvelope, Envelope, ReplyEnvelope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Encodes envelopes into transport strings and decodes them back.
pub struct Codec;

impl Codec {
    /// Encodes a call envelope.
    pub fn encode_call(call: &CallEnvelope) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(call)?)
    }

    /// Encodes a reply envelope.
    pub fn encode_reply(reply: &ReplyEnvelope) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(reply)?)
    }

    /// Encodes a push payload (a message sent without a preceding call).
    pub fn encode_push<T: Serialize>(payload: &T) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(payload)?)
    }

    /// Decodes a push payload.
    pub fn decode_push<T: DeserializeOwned>(data: &str) -> Result<T, ProtocolError> {
        Ok(serde_json::from_str(data)?)
    }

    /// Decodes an inbound envelope.
    ///
    /// Envelopes carrying a `method` are calls; everything else keyed by an
    /// `id` is treated as a reply.
    pub fn decode(data: &str) -> Result<Envelope, ProtocolError> {
        let msg: Value = serde_json::from_str(data)?;
        let Some(obj) = msg.as_object() else {
            return Err(ProtocolError::MalformedEnvelope(
                "envelope is not a JSON object".to_string(),
            ));
        };

        if !obj.contains_key("id") {
            return Err(ProtocolError::MalformedEnvelope(
                "envelope has no id".to_string(),
            ));
        }

        if obj.contains_key("method") {
            let call: CallEnvelope = serde_json::from_value(msg)?;
            Ok(Envelope::Call(call))
        } else {
            let reply: ReplyEnvelope = serde_json::from_value(msg)?;
            Ok(Envelope::Reply(reply))
        }
    }

    /// Converts an argument or result into a JSON value.
    pub fn to_value<T: Serialize>(value: &T) -> Result<Value, ProtocolError> {
        Ok(serde_json::to_value(value)?)
    }

    /// Converts a JSON value into a typed argument or result.
    pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, ProtocolError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::message::RemoteError;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_decode_dispatches_on_shape() {
        let call = CallEnvelope::new("1", "getModels", vec![]);
        let encoded = Codec::encode_call(&call).unwrap();
        assert_eq!(Codec::decode(&encoded).unwrap(), Envelope::Call(call));

        let reply = ReplyEnvelope::ok("1", json!([]));
        let encoded = Codec::encode_reply(&reply).unwrap();
        assert_eq!(Codec::decode(&encoded).unwrap(), Envelope::Reply(reply));
    }

    #[test]
    fn test_decode_error_reply() {
        let reply = ReplyEnvelope::error("9", RemoteError::new(ErrorCode::HandlerFailed, "boom"));
        let encoded = Codec::encode_reply(&reply).unwrap();
        match Codec::decode(&encoded).unwrap() {
            Envelope::Reply(decoded) => {
                assert_eq!(decoded.id, "9");
                assert_eq!(decoded.error.unwrap().message, "boom");
            }
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(
            Codec::decode("[1,2,3]"),
            Err(ProtocolError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            Codec::decode(r#"{"method":"x"}"#),
            Err(ProtocolError::MalformedEnvelope(_))
        ));
        assert!(matches!(Codec::decode("not json"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_non_string_map_keys_rejected_before_send() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        assert!(matches!(Codec::to_value(&map), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_non_finite_float_encodes_as_null() {
        assert_eq!(Codec::to_value(&f64::NAN).unwrap(), Value::Null);
    }

    #[test]
    fn test_push_roundtrip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Patch {
            language: Option<String>,
        }

        let encoded = Codec::encode_push(&Patch {
            language: Some("fr".into()),
        })
        .unwrap();
        let decoded: Patch = Codec::decode_push(&encoded).unwrap();
        assert_eq!(decoded.language.as_deref(), Some("fr"));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::hash_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_call_args_survive_transport(args in prop::collection::vec(arb_json(), 0..4)) {
            let call = CallEnvelope::new("42", "setPrompts", args);
            let encoded = Codec::encode_call(&call).unwrap();
            prop_assert_eq!(Codec::decode(&encoded).unwrap(), Envelope::Call(call));
        }

        #[test]
        fn prop_reply_result_survives_transport(result in arb_json()) {
            let reply = ReplyEnvelope::ok("42", result);
            let encoded = Codec::encode_reply(&reply).unwrap();
            prop_assert_eq!(Codec::decode(&encoded).unwrap(), Envelope::Reply(reply));
        }
    }
}
